use anyhow::{bail, Context, Result};

use slotdb::db::Db;

fn main() -> Result<()> {
    env_logger::init();

    // Parse arguments
    let args = std::env::args().collect::<Vec<_>>();
    match args.len() {
        0 | 1 => bail!("Missing <storage dir> and <command>"),
        2 => bail!("Missing <command>"),
        _ => {}
    }

    // Parse command and act accordingly
    let command = &args[2];
    match command.as_str() {
        ".tables" => {
            let db = Db::open(&args[1]).context("open storage directory")?;

            for name in db.tables() {
                print!("{}   ", name);
            }
            println!();
        }
        ".schema" => {
            let db = Db::open(&args[1]).context("open storage directory")?;

            for name in db.tables() {
                println!("{name}:");
                if let Some(schema) = db.schema(&name) {
                    for attr in schema.attributes() {
                        println!("  {:<20}{:<10}{}", attr.name, attr.dtype.as_str(), attr.size);
                    }
                }
            }
        }
        ".stats" => {
            let mut db = Db::open(&args[1]).context("open storage directory")?;

            match args.get(3) {
                Some(table) => {
                    let stats = db.stats(table).context("collect statistics")?;
                    print!("{stats}");
                }
                None => {
                    for (table, stats) in db.stats_all().context("collect statistics")? {
                        println!("{table}:");
                        print!("{stats}");
                    }
                }
            }
        }
        _ => bail!("Missing or invalid command passed: {}", command),
    }

    Ok(())
}
