use anyhow::{bail, Context, Result};
use std::env;
use std::fs;
use std::path::Path;

use barangay_planner::{
    db, telemetry, HouseholdRecord, LedgerCollection, Planner, PlannerConfig, RecommendationRecord,
    LATEST_SCOPE,
};

const USAGE: &str = "Usage:
  barangay-planner import-ledger <csv> [collection]
  barangay-planner import-households <csv>
  barangay-planner set-total <year> <amount>
  barangay-planner recommend [households.json]    (stored households when omitted)
  barangay-planner budget <year>
  barangay-planner show
  barangay-planner summary

Configuration is read from PLANNER_* environment variables.";

fn main() -> Result<()> {
    telemetry::init_tracing();

    let args: Vec<String> = env::args().collect();
    let config = PlannerConfig::from_env().context("Invalid configuration")?;

    match args.get(1).map(String::as_str) {
        Some("import-ledger") => run_import(&config, &args[2..]),
        Some("import-households") => run_import_households(&config, &args[2..]),
        Some("set-total") => run_set_total(&config, &args[2..]),
        Some("recommend") => run_recommend(&config, &args[2..]),
        Some("budget") => run_budget(&config, &args[2..]),
        Some("show") => run_show(&config),
        Some("summary") => run_summary(&config),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn run_import(config: &PlannerConfig, args: &[String]) -> Result<()> {
    let csv_path = match args.first() {
        Some(p) => Path::new(p),
        None => bail!("import-ledger needs a CSV path"),
    };

    let collection = match args.get(1) {
        Some(name) => name.parse::<LedgerCollection>()?,
        None => LedgerCollection::detect_from_filename(csv_path)?,
    };

    println!("📒 Ledger Import - {} → {}", csv_path.display(), collection);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let rows = barangay_planner::load_ledger_csv(csv_path, collection)
        .with_context(|| format!("Failed to read {}", csv_path.display()))?;
    println!("✓ Loaded {} rows from CSV", rows.len());

    let conn = db::open_database(&config.database_path).context("Failed to open database")?;
    let inserted = db::insert_ledger_rows(&conn, &rows)?;

    println!("✓ Inserted: {} rows", inserted);
    println!("✓ Skipped duplicates: {}", rows.len() - inserted);

    Ok(())
}

fn run_import_households(config: &PlannerConfig, args: &[String]) -> Result<()> {
    let csv_path = match args.first() {
        Some(p) => Path::new(p),
        None => bail!("import-households needs a CSV path"),
    };

    let text = fs::read_to_string(csv_path)
        .with_context(|| format!("Failed to read {}", csv_path.display()))?;

    let planner = Planner::from_config(config).context("Failed to load planner")?;
    let inserted = planner.import_households_csv(&text)?;

    println!("🏠 Household Import - {}", csv_path.display());
    println!("✓ Inserted: {} households", inserted);
    println!("✓ Stored total: {}", planner.households()?.len());

    Ok(())
}

fn run_set_total(config: &PlannerConfig, args: &[String]) -> Result<()> {
    let (year, amount) = match (args.first(), args.get(1)) {
        (Some(y), Some(a)) => (y.parse::<i32>().context("Year must be an integer")?, a),
        _ => bail!("set-total needs <year> <amount>"),
    };

    let conn = db::open_database(&config.database_path).context("Failed to open database")?;
    db::upsert_total_budget(&conn, year, amount)?;

    println!("✅ Total budget for {} set to ₱{}", year, amount);
    Ok(())
}

fn run_recommend(config: &PlannerConfig, args: &[String]) -> Result<()> {
    let planner = Planner::from_config(config).context("Failed to load planner")?;

    let record = match args.first() {
        Some(p) => {
            let path = Path::new(p);
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let households: Vec<HouseholdRecord> = serde_json::from_str(&content)
                .context("Households file must be a JSON array of objects")?;
            planner.generate_recommendations(&households)?
        }
        None => planner.generate_from_stored()?,
    };

    print_record(&record);
    Ok(())
}

fn run_budget(config: &PlannerConfig, args: &[String]) -> Result<()> {
    let year = match args.first() {
        Some(y) => y.parse::<i32>().context("Year must be an integer")?,
        None => bail!("budget needs <year>"),
    };

    let planner = Planner::from_config(config).context("Failed to load planner")?;
    let report = planner.predict_budget(year)?;

    println!("💰 Budget {} - official ₱{:.2}", report.year, report.official_total);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for b in &report.budgets {
        println!(
            "{:<55} PS ₱{:>14.2}  MOOE ₱{:>14.2}  CO ₱{:>14.2}  = ₱{:>14.2}",
            b.program, b.ps, b.mooe, b.co, b.total
        );
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "✓ Computed total ₱{:.2} ({} recommendations updated)",
        report.computed_total, report.merged
    );

    Ok(())
}

fn run_show(config: &PlannerConfig) -> Result<()> {
    let conn = db::open_database(&config.database_path).context("Failed to open database")?;
    let record = db::load_recommendation_record(&conn, LATEST_SCOPE)?;
    print_record(&record);
    Ok(())
}

fn run_summary(config: &PlannerConfig) -> Result<()> {
    let conn = db::open_database(&config.database_path).context("Failed to open database")?;

    println!("📊 Ledger Summary");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for s in db::ledger_summary(&conn)? {
        println!(
            "{:<20} {:>6} rows  PS ₱{:>14.2}  MOOE ₱{:>14.2}  CO ₱{:>14.2}",
            s.collection.name(),
            s.rows,
            s.ps,
            s.mooe,
            s.co
        );
    }

    println!("\n🏦 Total Budgets");
    for t in db::list_total_budgets(&conn)? {
        println!("{}: ₱{}", t.year, t.amount);
    }

    Ok(())
}

fn print_record(record: &RecommendationRecord) {
    println!(
        "📋 Recommendations for {} households ({} programs)",
        record.total_households,
        record.recommendations.len()
    );
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for (i, r) in record.recommendations.iter().enumerate() {
        let budget = r
            .budget
            .as_ref()
            .map(|b| format!("₱{:.2}", b.total))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>2}. [{:<6}] {:<55} {:>5} households  need {:>8.3}  {}",
            i + 1,
            r.priority,
            r.title,
            r.beneficiary_count,
            r.need_score,
            budget
        );
    }
}
