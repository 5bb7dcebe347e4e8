use std::env;
use std::fs::File;
use std::process::ExitCode;

use mobi_reader::Document;

/// Dump the headers, metadata, and text statistics of a MOBI file.
fn main() -> ExitCode {
    env_logger::init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: mobi-reader <file.mobi>");
        return ExitCode::FAILURE;
    };

    let file = match File::open(&path) {
        Ok(file) => file,
        Err(error) => {
            eprintln!("{path}: {error}");
            return ExitCode::FAILURE;
        }
    };

    let doc = Document::open(file);
    if let Some(header) = doc.pdb_header() {
        println!(
            "database: {} ({})",
            header.name_lossy(),
            String::from_utf8_lossy(&header.database_type)
        );
        println!("created:  {}", header.creation_time());
        println!("records:  {}", header.record_count);
    }
    println!("valid:    {}", doc.is_valid());
    println!("drm:      {}", doc.has_drm());
    for (key, value) in doc.metadata() {
        println!("{key:?}: {value:?}");
    }
    println!("images:   {}", doc.image_count());
    println!("text:     {} characters", doc.text().chars().count());

    if doc.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
