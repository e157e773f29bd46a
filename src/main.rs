use std::{io, path::PathBuf};

use anyhow::{format_err, Context as _};
use serde_json as json;
use structopt::StructOpt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use intake_sqlite::{
    urlpath_to_sqliteurl, DataSource, Db, DirSink, JsonLinesSink, OpenOptions, Sink,
    SqliteCatalog, SqliteCatalogArgs, SqliteSource, SqliteSourceArgs,
};

/// Open a SQLite database by local path or URL.
///
/// Remote databases are downloaded once and cached. Without --list, --sql or
/// --output-dir, the resolved connection string is printed.
#[derive(StructOpt)]
struct Opt {
    /// Local path or URL of the SQLite database.
    urlpath: String,
    /// Directory to cache remote databases in.
    #[structopt(long = "cache-dir")]
    cache_dir: Option<PathBuf>,
    /// Retrieval option, as KEY=VALUE.
    ///
    /// VALUE is parsed as JSON if possible and taken as a string otherwise.
    #[structopt(long = "storage-option", number_of_values = 1)]
    storage_options: Vec<String>,
    /// List the tables of the database.
    #[structopt(long = "list")]
    list: bool,
    /// Include views in the table list and the dump.
    #[structopt(long = "views")]
    views: bool,
    /// Query, or table name, whose rows to print as JSON lines.
    #[structopt(long = "sql")]
    sql: Option<String>,
    /// Dump schema and table contents into this directory.
    #[structopt(long = "output-dir")]
    output_dir: Option<PathBuf>,
    /// Log at debug level (RUST_LOG takes precedence).
    #[structopt(short = "v", long = "verbose")]
    verbose: bool,
}

fn parse_storage_option(option: &str) -> anyhow::Result<(String, json::Value)> {
    let (key, value) = option
        .split_once('=')
        .ok_or_else(|| format_err!("storage option {:?} is not of the form KEY=VALUE", option))?;
    let value = json::from_str(value).unwrap_or_else(|_| json::Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

impl Opt {
    fn open_options(&self) -> anyhow::Result<OpenOptions> {
        let mut options = OpenOptions::new();
        for option in &self.storage_options {
            let (key, value) = parse_storage_option(option)?;
            options.insert(key, value);
        }
        if let Some(dir) = &self.cache_dir {
            let dir = dir
                .to_str()
                .ok_or_else(|| format_err!("cache directory {:?} is not valid UTF-8", dir))?;
            options.insert("cache_storage", dir);
        }
        Ok(options)
    }

    fn has_action(&self) -> bool {
        self.list || self.sql.is_some() || self.output_dir.is_some()
    }
}

fn fill_sink(sink: &mut impl Sink, catalog: &SqliteCatalog) -> anyhow::Result<()> {
    let mut db = Db::open(catalog.url())?;
    let tx = db.transaction()?;
    let schema = tx.read_schema().context("unable to read schema")?;
    for entry in &schema {
        sink.write_schema_entry(entry)?;
    }
    for entry in catalog.entries() {
        let frame = entry
            .source()
            .read()
            .with_context(|| format!("error reading table {}", entry.name()))?;
        sink.write_table(entry.name(), &frame)?;
    }
    sink.close()?;
    Ok(())
}

fn run(opt: &Opt) -> anyhow::Result<()> {
    let options = opt.open_options()?;
    if !opt.has_action() {
        println!("{}", urlpath_to_sqliteurl(&opt.urlpath, &options)?);
        return Ok(());
    }

    if opt.list || opt.output_dir.is_some() {
        let mut args = SqliteCatalogArgs::new(&opt.urlpath);
        args.views = opt.views;
        args.open_options = options.clone();
        let catalog = SqliteCatalog::new(args)?;
        if opt.list {
            for name in catalog.names() {
                println!("{}", name);
            }
        }
        if let Some(output_dir) = &opt.output_dir {
            let mut sink = DirSink::open(output_dir)
                .with_context(|| format!("could not create {}", output_dir.display()))?;
            fill_sink(&mut sink, &catalog)?;
            tracing::info!(tables = catalog.len(), dir = %output_dir.display(), "dumped");
        }
    }

    if let Some(sql) = &opt.sql {
        let mut args = SqliteSourceArgs::new(&opt.urlpath, sql);
        args.open_options = options;
        let frame = SqliteSource::new(args)?.read()?;
        let stdout = io::stdout();
        let mut sink = JsonLinesSink::new(io::BufWriter::new(stdout.lock()));
        sink.write_table(sql, &frame)?;
        sink.close()?;
    }
    Ok(())
}

fn main() {
    let opt = Opt::from_args();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if opt.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let rc = match run(&opt) {
        Ok(()) => 0,
        Err(e) => {
            for (i, e) in e.chain().enumerate() {
                if i == 0 {
                    eprintln!("{}", e);
                } else {
                    eprintln!("caused by: {}", e);
                }
            }
            1
        }
    };
    std::process::exit(rc);
}
