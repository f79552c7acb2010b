#![no_main]
use libfuzzer_sys::fuzz_target;
use smithsonite::{CollectListener, ColumnMap, ExtraKind, SheetSelector, Workbook};
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let mut workbook = match Workbook::new(Cursor::new(data.to_vec())) {
        Ok(workbook) => workbook,
        Err(_) => return,
    };
    workbook
        .options_mut()
        .sheets(SheetSelector::All)
        .extra(ExtraKind::Comment)
        .extra(ExtraKind::Hyperlink)
        .extra(ExtraKind::Merge);
    let mut listener = CollectListener::<ColumnMap>::new();
    if workbook.read_maps(&mut listener).is_ok() {
        listener.rows().iter().map(|r| r.len()).sum::<usize>();
    }
});
