use anyhow::{bail, Context};
use billing_split::config::toml_config::SplitConfig;
use billing_split::core::ConfigProvider;
use billing_split::split_totals;
use billing_split::utils::logger;
use clap::Parser;

#[derive(Parser)]
#[command(name = "split-totals")]
#[command(about = "Split per-category billing totals between the two entities")]
struct Args {
    /// Path to TOML configuration file (built-in categories when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Category totals as NAME=AMOUNT, e.g. Consultas=1200
    #[arg(required = true)]
    amounts: Vec<String>,

    /// Print the split as JSON
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn parse_amount(raw: &str) -> anyhow::Result<(String, f64)> {
    let Some((name, amount)) = raw.split_once('=') else {
        bail!("expected NAME=AMOUNT, got '{}'", raw);
    };
    let amount: f64 = amount
        .trim()
        .parse()
        .with_context(|| format!("amount for '{}' is not a number", name))?;
    Ok((name.trim().to_string(), amount))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    let config = match &args.config {
        Some(path) => SplitConfig::from_file(path)?,
        None => SplitConfig::canonical(),
    };
    let categories = config.category_table()?;
    let amounts = args
        .amounts
        .iter()
        .map(|raw| parse_amount(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let split = split_totals(&categories, &amounts)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&split)?);
        return Ok(());
    }

    let (entity_a, entity_b) = config.entity_labels();
    println!("{:<14} {:>12} {:>12} {:>12}", "Category", "Total", entity_a, entity_b);
    for line in &split.categories {
        println!(
            "{:<14} {:>12.2} {:>12.2} {:>12.2}",
            line.category, line.total, line.entity_a, line.entity_b
        );
    }
    println!(
        "{:<14} {:>12.2} {:>12.2} {:>12.2}",
        "TOTAL", split.total, split.entity_a, split.entity_b
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("Consultas=1200").unwrap(), ("Consultas".to_string(), 1200.0));
        assert_eq!(parse_amount(" Urgencias = 10.5").unwrap().1, 10.5);
        assert!(parse_amount("Consultas").is_err());
        assert!(parse_amount("Consultas=abc").is_err());
    }
}
