//! Sync command implementation.
//!
//! Streams a source and a destination through the chunked loader. A file
//! destination is only reconciled in memory (use `--output` to persist the
//! result); a database destination gets each chunk's diff applied as soon as
//! the chunk is reconciled, one transaction per chunk.
//!
//! `--output` and `--changes` are written chunk by chunk to temp files that
//! replace their targets only after the whole run succeeded.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::SyncArgs;
use crate::config::ImportConfig;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::loader::{
    Chunk, ChunkedLoader, CsvOptions, CsvSource, FieldMapping, JsonlSource, LoaderConfig,
    RawRecord,
};
use crate::model::Record;
use crate::storage::{ApplyStats, BufferedRows, SqliteStorage, TableSpec};
use crate::sync::{ChangeRecord, JsonlWriter, LoadSummary};

type RawStream = Box<dyn Iterator<Item = Result<RawRecord>> + Send>;
type RecordStream = Box<dyn Iterator<Item = Result<Record>> + Send>;

/// Effective settings of one run: config file values overridden by flags.
struct Settings {
    mapping: FieldMapping,
    loader: LoaderConfig,
    csv: CsvOptions,
    buffer_size: usize,
}

impl Settings {
    fn resolve(args: &SyncArgs, config: &ImportConfig) -> Result<Self> {
        let key_fields = if args.key.is_empty() {
            config.key_fields.clone()
        } else {
            args.key.clone()
        };
        if key_fields.is_empty() {
            return Err(Error::InvalidArgument(
                "no key fields: pass --key or set key_fields in the config file".to_string(),
            ));
        }
        let content_fields = if args.content.is_empty() {
            config.content_fields.clone()
        } else {
            args.content.clone()
        };

        let mut loader = LoaderConfig::new(
            args.chunk_size.unwrap_or(config.chunk_size),
            args.strategy.unwrap_or(config.strategy),
        )?;
        if args.unsorted {
            loader = loader.unsorted();
        }

        Ok(Self {
            mapping: FieldMapping::new(key_fields, content_fields)?,
            loader,
            csv: CsvOptions {
                has_header: config.has_header && !args.no_header,
                typed: config.typed_csv || args.typed,
                ..CsvOptions::default()
            },
            buffer_size: config.buffer_size,
        })
    }
}

/// Receives reconciled chunks in order.
struct Sink<'a> {
    mapping: &'a FieldMapping,
    database: Option<(SqliteStorage, TableSpec)>,
    dry_run: bool,
    output: Option<JsonlWriter>,
    changes: Option<JsonlWriter>,
    applied: ApplyStats,
}

impl Sink<'_> {
    fn accept(&mut self, chunk: &Chunk<Record>) -> Result<()> {
        let diff = &chunk.destination;

        if let Some((storage, spec)) = self.database.as_mut() {
            if !self.dry_run {
                let stats = storage.apply_diff(spec, diff)?;
                self.applied.inserted += stats.inserted;
                self.applied.updated += stats.updated;
                self.applied.deleted += stats.deleted;
            }
        }
        if let Some(writer) = self.changes.as_mut() {
            writer.write_all(ChangeRecord::from_diff(diff))?;
        }
        if let Some(writer) = self.output.as_mut() {
            let mapping = self.mapping;
            writer.write_all(diff.iter().map(|record| mapping.flatten(record)))?;
        }

        debug!(chunk = chunk.index, "Chunk handled");
        Ok(())
    }

    /// Move the streamed files over their targets.
    fn commit(&mut self) -> Result<()> {
        for writer in [self.output.take(), self.changes.take()].into_iter().flatten() {
            writer.commit()?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SyncOutput<'a> {
    success: bool,
    dry_run: bool,
    summary: &'a LoadSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<ApplyStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    changes: Option<String>,
}

/// Execute the sync command.
///
/// # Errors
///
/// Returns an error if the configuration or arguments are invalid, an input
/// cannot be read, a record cannot be built, or a write fails.
pub fn execute(args: &SyncArgs, config_path: Option<&Path>, json: bool, quiet: bool) -> Result<()> {
    let config = ImportConfig::resolve(config_path)?;
    let settings = Settings::resolve(args, &config)?;
    let dry_run = crate::is_dry_run();
    let loader = ChunkedLoader::new(settings.loader)?;
    let mapping = &settings.mapping;

    let source = open_records(&args.source, &settings.csv)?;
    let output = match &args.output {
        Some(path) if dry_run => {
            info!(path = %path.display(), "Dry run: output not written");
            None
        }
        Some(path) => Some(JsonlWriter::create(path)?),
        None => None,
    };
    let mut sink = Sink {
        mapping,
        database: None,
        dry_run,
        output,
        changes: args.changes.as_deref().map(JsonlWriter::create).transpose()?,
        applied: ApplyStats::default(),
    };

    let summary = match (&args.destination, &args.db, &args.table) {
        (Some(path), _, _) => {
            let destination = open_records(path, &settings.csv)?;
            loader.run(
                source,
                destination,
                |raw| mapping.build(raw),
                |raw| mapping.build(raw),
                |chunk| sink.accept(&chunk),
            )?
        }
        (None, Some(db), Some(table)) => {
            if mapping.content_fields().is_empty() {
                return Err(Error::InvalidArgument(
                    "--content is required with --db".to_string(),
                ));
            }
            let spec = TableSpec::new(
                table.as_str(),
                mapping.key_fields().iter().cloned(),
                mapping.content_fields().iter().cloned(),
            )?;
            let storage = SqliteStorage::open(db)?;
            let destination: RecordStream = if dry_run && !storage.table_exists(table)? {
                Box::new(std::iter::empty())
            } else {
                storage.create_table(&spec)?;
                Box::new(BufferedRows::open(db, spec.clone(), settings.buffer_size)?)
            };
            sink.database = Some((storage, spec));
            loader.run(
                source,
                destination,
                |raw| mapping.build(raw),
                Ok,
                |chunk| sink.accept(&chunk),
            )?
        }
        _ => {
            return Err(Error::InvalidArgument(
                "pass --destination, or --db with --table".to_string(),
            ));
        }
    };

    sink.commit()?;

    let applied = sink.database.as_ref().map(|_| sink.applied);
    if json {
        let output = SyncOutput {
            success: true,
            dry_run,
            summary: &summary,
            applied,
            output: args.output.as_ref().map(|p| p.display().to_string()),
            changes: args.changes.as_ref().map(|p| p.display().to_string()),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if !quiet {
        print_summary(&summary, applied, dry_run);
    }

    Ok(())
}

/// Open a raw record stream, picking the format from the file extension.
fn open_records(path: &Path, csv: &CsvOptions) -> Result<RawStream> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let stream: RawStream = match extension.as_deref() {
        Some("csv") => Box::new(CsvSource::open(path, csv)?),
        Some("tsv") => {
            let options = CsvOptions {
                delimiter: b'\t',
                ..csv.clone()
            };
            Box::new(CsvSource::open(path, &options)?)
        }
        _ => Box::new(JsonlSource::open(path)?),
    };
    Ok(stream)
}

fn print_summary(summary: &LoadSummary, applied: Option<ApplyStats>, dry_run: bool) {
    let title = if dry_run { "Sync preview" } else { "Sync complete" };
    println!(
        "{} ({} strategy, {} chunk(s))",
        title.cyan().bold(),
        summary.strategy,
        summary.chunks
    );
    println!(
        "  {}",
        format!(
            "{} source / {} destination records",
            summary.source_records, summary.destination_records
        )
        .dimmed()
    );
    println!();

    if summary.is_noop() {
        println!("Destination already in sync.");
    } else {
        println!("  {} added", format!("{:>6}", summary.added).green());
        println!("  {} changed", format!("{:>6}", summary.changed).yellow());
        println!("  {} removed", format!("{:>6}", summary.removed).red());
    }

    if let Some(stats) = applied {
        println!();
        if dry_run {
            println!("{}", "Dry run: database not modified".yellow());
        } else {
            println!(
                "Applied {} row change(s): {} inserted, {} updated, {} deleted",
                stats.total(),
                stats.inserted,
                stats.updated,
                stats.deleted
            );
        }
    }
}
