use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use famledger::config::{self, LedgerConfig};
use famledger::domain;
use famledger::export::{self, ImportMode};
use famledger::report::{self, Month};
use famledger::ui::{self, Icons, TableBuilder, record_table, section, success, summary_row};
use famledger::{Record, Store, aggregate};
use owo_colors::OwoColorize;
use serde_json::{Value, json};

use crate::{Ledger, OutputMode, emit_success};

/// Values on the command line are JSON when they parse, strings otherwise
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_month(raw: Option<&str>) -> anyhow::Result<Month> {
    match raw {
        Some(m) => Ok(m.parse()?),
        None => Ok(Month::current()),
    }
}

fn print_records(records: &[Record]) {
    if records.is_empty() {
        println!("{} No records found.", Icons::CROSS);
    } else {
        println!("{}", record_table(records));
        summary_row("Records:", &records.len().to_string());
    }
}

pub fn run_version(output_mode: OutputMode) -> anyhow::Result<()> {
    if output_mode.is_human() {
        ui::header(
            Icons::LEDGER,
            &format!("famledger {}", env!("CARGO_PKG_VERSION").bold()),
        );
        summary_row("Schema version:", &famledger::storage::schema::SCHEMA_VERSION.to_string());
    } else {
        let data = json!({
            "version": env!("CARGO_PKG_VERSION"),
            "schema_version": famledger::storage::schema::SCHEMA_VERSION,
        });
        emit_success(output_mode, "version", data)?;
    }
    Ok(())
}

pub fn run_init(
    output_mode: OutputMode,
    config_path: Option<&Path>,
    database: Option<PathBuf>,
    force: bool,
) -> anyhow::Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path);
    let config = LedgerConfig {
        database: Some(
            database
                .unwrap_or_else(|| config::default_database_path_in(Path::new("")))
                .to_string_lossy()
                .to_string(),
        ),
        retention_days: Some(famledger::trash::RETENTION_DAYS),
        export_dir: None,
        schema: None,
    };
    config::write_config(&path, &config, force)?;

    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let db_path = config.database_path_in(&base);
    config::ensure_db_dir(&db_path)?;
    let store = Store::open(&db_path, config.registry())?;
    let version = store.version();
    store.close()?;

    if output_mode.is_human() {
        success(&format!("Wrote {}", path.display()));
        ui::info("Database", &db_path.display().to_string());
        ui::info("Schema version", &version.to_string());
    } else {
        emit_success(
            output_mode,
            "init",
            json!({
                "config": path.display().to_string(),
                "database": db_path.display().to_string(),
                "schema_version": version,
            }),
        )?;
    }
    Ok(())
}

pub fn run_schema(ledger: &Ledger, output_mode: OutputMode) -> anyhow::Result<()> {
    let store = &ledger.store;
    let mut rows = Vec::new();
    for collection in &store.registry().collections {
        let on_disk = store.indexes_on_disk(&collection.name)?;
        rows.push(json!({
            "name": collection.name,
            "key": collection.key,
            "indexes": collection.indexes,
            "indexes_on_disk": on_disk,
        }));
    }

    if output_mode.is_human() {
        ui::header(Icons::DATABASE, &format!("Schema v{}", store.version()));
        let mut table = TableBuilder::new();
        for collection in &store.registry().collections {
            let indexes = if collection.indexes.is_empty() {
                ui::dim("-")
            } else {
                collection.indexes.join(", ")
            };
            table.add_row(
                &format!("{} (key: {})", collection.name, collection.key),
                &indexes,
            );
        }
        println!("{}", table.build());
    } else {
        emit_success(
            output_mode,
            "schema",
            json!({ "version": store.version(), "collections": rows }),
        )?;
    }
    Ok(())
}

pub fn run_add(ledger: &Ledger, output_mode: OutputMode, collection: &str, data: &str) -> anyhow::Result<()> {
    let record: Record = data.parse()?;
    let id = ledger.store.writer().create(collection, record)?;

    if output_mode.is_human() {
        success(&format!("Added {}/{}", collection, id));
    } else {
        emit_success(output_mode, "add", json!({ "collection": collection, "id": id }))?;
    }
    Ok(())
}

pub fn run_put(ledger: &Ledger, output_mode: OutputMode, collection: &str, data: &str) -> anyhow::Result<()> {
    let record: Record = data.parse()?;
    ledger.store.writer().put(collection, &record)?;

    if output_mode.is_human() {
        success(&format!("Saved record in {}", collection));
    } else {
        emit_success(output_mode, "put", json!({ "collection": collection, "record": record }))?;
    }
    Ok(())
}

pub fn run_get(ledger: &Ledger, output_mode: OutputMode, collection: &str, id: &str) -> anyhow::Result<()> {
    let record = ledger.store.reader().get(collection, id)?;

    if output_mode.is_human() {
        println!("{}", record_table(std::slice::from_ref(&record)));
    } else {
        emit_success(output_mode, "get", record.into_value())?;
    }
    Ok(())
}

pub fn run_delete(
    ledger: &mut Ledger,
    output_mode: OutputMode,
    collection: &str,
    id: &str,
    hard: bool,
) -> anyhow::Result<()> {
    if hard {
        let removed = ledger.store.writer().delete(collection, id)?;
        if output_mode.is_human() {
            if removed {
                success(&format!("Deleted {}/{}", collection, id));
            } else {
                ui::warn(&format!("{}/{} did not exist", collection, id));
            }
        } else {
            emit_success(output_mode, "delete", json!({ "removed": removed }))?;
        }
        return Ok(());
    }

    let entry = ledger
        .trash
        .soft_delete_by_id(&mut ledger.store, collection, id)?;
    if output_mode.is_human() {
        println!(
            "{} Moved {}/{} to trash (entry {})",
            Icons::TRASH,
            collection,
            id,
            entry.id
        );
        summary_row("Expires:", &entry.expires_at.format("%Y-%m-%d %H:%M UTC").to_string());
    } else {
        emit_success(output_mode, "delete", serde_json::to_value(&entry)?)?;
    }
    Ok(())
}

pub fn run_query(
    ledger: &Ledger,
    output_mode: OutputMode,
    collection: &str,
    index: &str,
    value: &str,
) -> anyhow::Result<()> {
    let records = ledger
        .store
        .reader()
        .query_by_index(collection, index, &parse_value(value))?;

    if output_mode.is_human() {
        println!("{} {}.{} = {}", Icons::SEARCH, collection, index, value);
        print_records(&records);
    } else {
        emit_success(output_mode, "query", serde_json::to_value(&records)?)?;
    }
    Ok(())
}

pub fn run_list(ledger: &Ledger, output_mode: OutputMode, collection: &str) -> anyhow::Result<()> {
    let records = ledger.store.reader().all(collection)?;

    if output_mode.is_human() {
        print_records(&records);
    } else {
        emit_success(output_mode, "list", serde_json::to_value(&records)?)?;
    }
    Ok(())
}

pub fn run_sum(
    ledger: &Ledger,
    output_mode: OutputMode,
    collection: &str,
    field: &str,
    month: Option<&str>,
) -> anyhow::Result<()> {
    let mut records = ledger.store.reader().all(collection)?;
    if let Some(raw) = month {
        let month: Month = raw.parse()?;
        records = month.filter(&records, "date").into_iter().cloned().collect();
    }
    let total = aggregate::sum(&records, field);

    if output_mode.is_human() {
        println!(
            "{} {} {} ({} records): {}",
            Icons::MONEY,
            collection,
            field,
            records.len(),
            ui::amount(total)
        );
    } else {
        emit_success(
            output_mode,
            "sum",
            json!({ "collection": collection, "field": field, "records": records.len(), "total": total }),
        )?;
    }
    Ok(())
}

pub fn run_group(
    ledger: &Ledger,
    output_mode: OutputMode,
    collection: &str,
    by: &str,
    sum_field: &str,
) -> anyhow::Result<()> {
    let records = ledger.store.reader().all(collection)?;
    let totals = aggregate::group_and_sum(&records, by, sum_field);

    if output_mode.is_human() {
        ui::header(Icons::STATS, &format!("{} {} by {}", collection, sum_field, by));
        let mut table = TableBuilder::new();
        for (group, total) in &totals {
            table.add_row(group, &format!("{:.2}", total));
        }
        println!("{}", table.build());
    } else {
        emit_success(output_mode, "group", serde_json::to_value(&totals)?)?;
    }
    Ok(())
}

pub fn run_variance(output_mode: OutputMode, current: f64, previous: f64) -> anyhow::Result<()> {
    let variance = aggregate::percent_variance(current, previous);

    if output_mode.is_human() {
        let icon = if variance < 0.0 { Icons::DOWN } else { Icons::UP };
        println!("{} {:.1}%", icon, variance);
    } else {
        emit_success(
            output_mode,
            "variance",
            json!({ "current": current, "previous": previous, "variance": variance }),
        )?;
    }
    Ok(())
}

pub fn run_report(ledger: &Ledger, output_mode: OutputMode, month: Option<&str>) -> anyhow::Result<()> {
    let month = parse_month(month)?;
    let reader = ledger.store.reader();
    let income = reader.all("income")?;
    let expenses = reader.all("expenses")?;
    let report = report::monthly_report(month, &income, &expenses);

    if output_mode.is_human() {
        ui::header(Icons::CALENDAR, &format!("Report for {}", report.month));
        let income = format!("{:.2} ({:+.1}%)", report.income, report.income_variance);
        let spent = format!("{:.2} ({:+.1}%)", report.expenses, report.expense_variance);
        let net = format!("{:.2}", report.net);
        let savings = format!("{:.1}%", report.savings_rate);
        println!(
            "{}",
            ui::stats_table(&[
                ("Income", income.as_str()),
                ("Expenses", spent.as_str()),
                ("Net", net.as_str()),
                ("Savings rate", savings.as_str()),
            ])
        );

        if !report.expenses_by_category.is_empty() {
            section("Expenses by category");
            for (category, total) in &report.expenses_by_category {
                summary_row(&format!("{}:", category), &ui::amount(*total));
            }
        }
    } else {
        emit_success(output_mode, "report", serde_json::to_value(&report)?)?;
    }
    Ok(())
}

pub fn run_budget(ledger: &Ledger, output_mode: OutputMode, month: Option<&str>) -> anyhow::Result<()> {
    let month = parse_month(month)?;
    let reader = ledger.store.reader();
    let budgets = reader.query_by_index("budgets", "month", &json!(month.to_string()))?;
    let expenses = reader.all("expenses")?;
    let usage = report::budget_usage(month, &budgets, &expenses);

    if output_mode.is_human() {
        ui::header(Icons::MONEY, &format!("Budgets for {}", month));
        if usage.is_empty() {
            println!("{} No budgets set for {}.", Icons::CROSS, month);
            return Ok(());
        }
        let mut table = TableBuilder::new();
        for line in &usage {
            let marker = if line.is_over() { Icons::WARN } else { Icons::CHECK };
            table.add_row(
                &line.category,
                &format!(
                    "{} {:.2} / {:.2} ({:.1}%)",
                    marker, line.spent, line.limit, line.percent_used
                ),
            );
        }
        println!("{}", table.build());
    } else {
        emit_success(output_mode, "budget", serde_json::to_value(&usage)?)?;
    }
    Ok(())
}

pub fn run_due(
    ledger: &mut Ledger,
    output_mode: OutputMode,
    date: Option<NaiveDate>,
    post: bool,
) -> anyhow::Result<()> {
    let today = date.unwrap_or_else(|| chrono::Local::now().date_naive());
    let reader = ledger.store.reader();
    let due = domain::due_recurring(&reader.all("recurring")?, today);
    let overdue = domain::overdue_debts(&reader.all("debts")?, today);

    let mut posted = 0usize;
    if post && !due.is_empty() {
        posted = ledger.store.transaction(|records| {
            let mut count = 0;
            for mut item in due.iter().cloned() {
                while item.is_due(today) {
                    let (collection, entry) = item.post()?;
                    records.put(collection, &entry)?;
                    count += 1;
                }
                records.put_typed(&item)?;
            }
            Ok(count)
        })?;
    }

    if output_mode.is_human() {
        ui::header(Icons::CALENDAR, &format!("Recurring items due by {}", today));
        if due.is_empty() {
            println!("{} Nothing due.", Icons::CHECK);
        } else {
            let mut table = TableBuilder::new();
            for item in &due {
                table.add_row(
                    &item.name,
                    &format!("{:.2} {} ({})", item.amount, item.category, item.next_date),
                );
            }
            println!("{}", table.build());
            if post {
                success(&format!("Posted {} entries", posted));
            }
        }

        if !overdue.is_empty() {
            section("Overdue debts");
            for debt in &overdue {
                let due_date = debt.due_date.map(|d| d.to_string()).unwrap_or_default();
                summary_row(
                    &format!("{} {}:", Icons::WARN, debt.creditor),
                    &format!("{} due {} ({:?} priority)", ui::amount(debt.amount), due_date, debt.priority),
                );
            }
        }
    } else {
        let due = serde_json::to_value(&due)?;
        let overdue = serde_json::to_value(&overdue)?;
        emit_success(
            output_mode,
            "due",
            json!({ "due": due, "posted": posted, "overdue_debts": overdue }),
        )?;
    }
    Ok(())
}

pub fn run_goals(ledger: &Ledger, output_mode: OutputMode) -> anyhow::Result<()> {
    let goals = domain::active_goals(&ledger.store.reader().all("goals")?);

    if output_mode.is_human() {
        ui::header(Icons::GOAL, "Active goals");
        if goals.is_empty() {
            println!("{} No active goals.", Icons::CROSS);
            return Ok(());
        }
        let mut table = TableBuilder::new();
        for goal in &goals {
            let deadline = goal
                .deadline
                .map(|d| format!(" by {}", d))
                .unwrap_or_default();
            table.add_row(
                &goal.name,
                &format!(
                    "{:.2} / {:.2} ({:.1}%){}",
                    goal.saved,
                    goal.target,
                    goal.progress(),
                    deadline
                ),
            );
        }
        println!("{}", table.build());
    } else {
        let rows: Vec<Value> = goals
            .iter()
            .map(|goal| json!({ "goal": goal, "progress": goal.progress() }))
            .collect();
        emit_success(output_mode, "goals", Value::Array(rows))?;
    }
    Ok(())
}

pub fn run_trash_list(ledger: &Ledger, output_mode: OutputMode) -> anyhow::Result<()> {
    let entries = ledger.trash.entries(&ledger.store)?;
    let now = chrono::Utc::now();

    if output_mode.is_human() {
        ui::header(
            Icons::TRASH,
            &format!("Trash ({} day retention)", ledger.trash.retention().num_days()),
        );
        if entries.is_empty() {
            println!("{} Trash is empty.", Icons::CHECK);
            return Ok(());
        }
        let rows: Vec<Record> = entries
            .iter()
            .map(|e| {
                Record::new()
                    .with("entry", e.id.clone())
                    .with("collection", e.collection.clone())
                    .with("record", e.record_id.clone())
                    .with("deleted", e.deleted_at.format("%Y-%m-%d %H:%M").to_string())
                    .with("expires", e.expires_at.format("%Y-%m-%d %H:%M").to_string())
                    .with("expired", if e.is_expired(now) { "yes" } else { "" })
            })
            .collect();
        println!("{}", record_table(&rows));
    } else {
        emit_success(output_mode, "trash.list", serde_json::to_value(&entries)?)?;
    }
    Ok(())
}

pub fn run_trash_restore(ledger: &mut Ledger, output_mode: OutputMode, id: &str) -> anyhow::Result<()> {
    let record = ledger.trash.restore(&mut ledger.store, id)?;

    if output_mode.is_human() {
        println!("{} Restored entry {}", Icons::RESTORE, id);
        println!("{}", record_table(std::slice::from_ref(&record)));
    } else {
        emit_success(output_mode, "trash.restore", record.into_value())?;
    }
    Ok(())
}

pub fn run_trash_discard(ledger: &Ledger, output_mode: OutputMode, id: &str) -> anyhow::Result<()> {
    let removed = ledger.trash.discard(&ledger.store, id)?;

    if output_mode.is_human() {
        if removed {
            success(&format!("Discarded trash entry {}", id));
        } else {
            ui::warn(&format!("No trash entry {}", id));
        }
    } else {
        emit_success(output_mode, "trash.discard", json!({ "removed": removed }))?;
    }
    Ok(())
}

pub fn run_trash_purge(ledger: &mut Ledger, output_mode: OutputMode) -> anyhow::Result<()> {
    let purged = ledger.trash.purge_expired(&mut ledger.store)?;

    if output_mode.is_human() {
        success(&format!("Purged {} expired entries", purged.len()));
    } else {
        emit_success(output_mode, "trash.purge", json!({ "purged": purged.len() }))?;
    }
    Ok(())
}

pub fn run_export(
    ledger: &Ledger,
    output_mode: OutputMode,
    out: Option<PathBuf>,
    include_trash: bool,
) -> anyhow::Result<()> {
    let dir = out.unwrap_or_else(|| ledger.config.export_dir_in(&ledger.base));
    let bundle = export::export_all(&ledger.store, include_trash)?;
    let path = export::write_bundle(&bundle, &dir)?;

    if output_mode.is_human() {
        println!(
            "{} Exported {} records to {}",
            Icons::PACKAGE,
            bundle.record_count(),
            path.display()
        );
    } else {
        emit_success(
            output_mode,
            "export",
            json!({ "path": path.display().to_string(), "records": bundle.record_count() }),
        )?;
    }
    Ok(())
}

pub fn run_import(ledger: &mut Ledger, output_mode: OutputMode, file: &Path, replace: bool) -> anyhow::Result<()> {
    let bundle = export::read_bundle(file)?;
    let mode = if replace { ImportMode::Replace } else { ImportMode::Merge };
    let report = export::import_bundle(&mut ledger.store, &bundle, mode)?;

    if output_mode.is_human() {
        success(&report.to_string());
    } else {
        emit_success(
            output_mode,
            "import",
            json!({ "collections": report.collections, "records": report.records, "cleared": report.cleared }),
        )?;
    }
    Ok(())
}

pub fn run_stats(ledger: &Ledger, output_mode: OutputMode) -> anyhow::Result<()> {
    let stats = ledger.store.stats()?;

    if output_mode.is_human() {
        let where_ = ledger
            .store
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "in-memory".to_string());
        ui::header(Icons::STATS, &format!("famledger statistics ({})", where_));
        let mut table = TableBuilder::new();
        table.add_row("Schema version", &stats.version.to_string());
        for (name, count) in &stats.collections {
            table.add_row(name, &count.to_string());
        }
        table.add_row("Total", &stats.total_records().to_string());
        println!("{}", table.build());
    } else {
        emit_success(
            output_mode,
            "stats",
            json!({
                "version": stats.version,
                "collections": stats.collections.iter().cloned().collect::<std::collections::BTreeMap<_, _>>(),
                "total": stats.total_records(),
            }),
        )?;
    }
    Ok(())
}
