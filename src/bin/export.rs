use std::fs::File;
use std::io;
use std::path::PathBuf;

use stagegate::export::write_csv;
use stagegate::wal::Wal;

/// Usage: stagegate-export <ledger.wal> [out.csv]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let mut args = std::env::args().skip(1);
    let Some(wal_path) = args.next().map(PathBuf::from) else {
        eprintln!("usage: stagegate-export <ledger.wal> [out.csv]");
        std::process::exit(2);
    };
    let records = Wal::replay(&wal_path)?;

    let rows = match args.next() {
        Some(out) => write_csv(&records, File::create(&out)?)?,
        None => write_csv(&records, io::stdout().lock())?,
    };
    tracing::info!(rows, ledger = %wal_path.display(), "exported bookings");
    Ok(())
}
