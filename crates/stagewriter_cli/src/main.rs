//! CLI smoke entry point.
//!
//! Runs one staged write cycle against an in-memory database and prints
//! deterministic `key=value` lines. An optional first argument points at a
//! JSON configuration file.

use log::info;
use stagewriter_core::db::open_db_in_memory;
use stagewriter_core::{
    core_version, Record, RecordListQuery, SqliteRecordRepository, SqliteTransactionScope,
    StageWriterConfig, Writer,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run(std::env::args().nth(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("stagewriter error={err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: Option<String>) -> Result<(), Box<dyn Error>> {
    let config = match config_path {
        Some(path) => StageWriterConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => StageWriterConfig::default(),
    };
    let logging_active = config.logging.init()?;

    println!("stagewriter_core version={}", core_version());
    println!("logging active={logging_active}");
    println!(
        "writer rollback_policy={}",
        config.writer.rollback_policy.as_str()
    );

    let conn = open_db_in_memory()?;
    let mut writer = Writer::with_options(
        SqliteRecordRepository::new(&conn),
        Record::same_identity,
        config.writer,
    );

    let welcome = Record::new("note", "welcome");
    let scratch = Record::new("note", "scratch");
    writer.add_to_create([welcome.clone(), scratch.clone()]);
    writer.save(None)?;

    let mut edited = welcome;
    edited.body = "welcome back".to_string();
    writer.set_to_update(edited);
    writer.delete([scratch]);

    let mut scope = SqliteTransactionScope::begin(&conn)?;
    writer.save(Some(&mut scope))?;
    println!("scope participants={}", scope.participant_count());
    scope.commit()?;

    let stored = writer.repository().list_records(&RecordListQuery::default())?;
    info!(
        "event=cli_smoke module=cli status=ok stored={} active={}",
        stored.len(),
        writer.get_all_active().len()
    );
    println!("records stored={}", stored.len());
    for record in &stored {
        println!("record kind={} body={}", record.kind, record.body);
    }
    Ok(())
}
