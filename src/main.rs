use billing_split::domain::model::{DistributionResult, PhysicianDistribution, Standing};
use billing_split::utils::error::ErrorSeverity;
use billing_split::utils::{logger, validation::Validate};
use billing_split::{CliConfig, DistributionEngine, DistributionPipeline, LocalStorage};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting billing-split");
    tracing::debug!("CLI config: {:?}", cli);

    let config = match cli.resolve().and_then(|config| config.validate().map(|_| config)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    tracing::info!(
        "✅ Configuration '{}' loaded: {} categories, {} tier rules",
        config.run.name,
        config.categories.len(),
        config.tiers.len()
    );
    let (entity_a, entity_b) = (config.entities.entity_a.clone(), config.entities.entity_b.clone());

    let storage = LocalStorage::new(".");
    let pipeline = DistributionPipeline::new(storage, config);
    let engine = DistributionEngine::new(pipeline).dry_run(cli.dry_run);

    match engine.run().await {
        Ok(report) => {
            print_summary(&report.result, &entity_a, &entity_b);
            for name in &cli.physician {
                match report.result.physician(name) {
                    Some(physician) => print_physician(physician, &entity_a),
                    None => eprintln!("⚠️ Physician '{}' is not on the roster", name),
                }
            }
            if let Some(output_path) = report.output_path {
                println!("📁 Output saved to: {}", output_path);
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ Distribution failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn print_summary(result: &DistributionResult, entity_a: &str, entity_b: &str) {
    let totals = &result.totals;
    println!("✅ Distribution computed");
    println!("   Gross billing:       {:>14.2} €", totals.gross);
    println!("   {:<20} {:>14.2} €", format!("{}:", entity_a), totals.entity_a);
    println!("   {:<20} {:>14.2} €", format!("{} pool:", entity_b), totals.entity_b_pool);
    println!("   Paid to physicians:  {:>14.2} €", totals.total_payout);
    println!("   Pool balance after:  {:>14.2} €", totals.pool_balance_after);
    if result.is_overdrawn() {
        println!("⚠️ The {} pool is overdrawn", entity_b);
    }
    if result.has_warnings() {
        println!("⚠️ {} warning(s):", result.warnings.len());
        for warning in &result.warnings {
            println!("   - {}", warning);
        }
    }
}

fn print_physician(p: &PhysicianDistribution, entity_a: &str) {
    println!();
    println!("👨‍⚕️ {} ({})", p.name, p.tier);
    println!(
        "   {:<14} {:>12} {:>12} {:>12} {:>12}",
        "Category", "Billed", entity_a, "Pool", "Payout"
    );
    for line in &p.breakdown {
        println!(
            "   {:<14} {:>12.2} {:>12.2} {:>12.2} {:>12.2}",
            line.category, line.billed, line.entity_a, line.pool, line.payout
        );
    }
    println!(
        "   {:<14} {:>12.2} {:>12.2} {:>12.2} {:>12.2}",
        "TOTAL", p.gross, p.entity_a, p.pool_share, p.payout
    );

    match p.standing {
        Standing::Above => println!(
            "   Above the {} average ({:.2}); paid {:.0}% of the pool share",
            p.tier,
            p.tier_average,
            p.percentage * 100.0
        ),
        Standing::AtOrBelow => println!(
            "   At or below the {} average ({:.2}); paid {:.0}% of the pool share, {:.2} if above",
            p.tier,
            p.tier_average,
            p.percentage * 100.0,
            p.projected_if_above
        ),
    }
    println!("   Retained in pool: {:.2}", p.retained_in_pool);
    if !p.idle_categories.is_empty() {
        println!("   No billing in: {}", p.idle_categories.join(", "));
    }
}
