use serde_json::json;
use slotbook_core::{
    render_report, verify, CorpusArchiver, LookupTableBuilder, OutcomeCorpus, ToleranceBands,
};

fn main() -> slotbook_core::Result<()> {
    // Small end-to-end run over an in-memory corpus
    let books = vec![
        json!({ "id": 1, "payoutMultiplier": 0.0, "events": [] }),
        json!({ "id": 2, "payoutMultiplier": 0.5, "events": [] }),
        json!({ "id": 3, "payoutMultiplier": 1.2, "events": [] }),
        json!({ "id": 4, "payoutMultiplier": 2.148, "events": [] }),
    ];
    let corpus = OutcomeCorpus::from_values("demo", books)?;

    let table = LookupTableBuilder::default().build(&corpus)?;
    let mut csv = Vec::new();
    table.write_csv(&mut csv)?;
    print!("{}", String::from_utf8_lossy(&csv));

    let mut archive = Vec::new();
    let summary = CorpusArchiver::default().archive(&corpus, &mut archive)?;
    println!(
        "archived {} records: {} bytes -> {} bytes",
        summary.records,
        summary.uncompressed_bytes,
        archive.len()
    );

    let report = verify(&table, 0.962, &ToleranceBands::default())?;
    print!("{}", render_report("demo", &report));
    Ok(())
}
