//! `steward pricing`: Show model pricing.

use steward_telemetry::PricingTable;

use super::load_config;

pub fn run(model: Option<&str>) -> anyhow::Result<()> {
    let config = load_config()?;
    let table = PricingTable::from_config(&config.pricing);

    if let Some(model) = model {
        let snap = table.snapshot(model);
        println!("{model}");
        println!("  prompt:     ${}/1M tokens", snap.prompt_usd_per_1m);
        println!("  completion: ${}/1M tokens", snap.completion_usd_per_1m);
        println!(
            "  10k prompt + 1k completion: ${:.6}",
            table.compute_cost(model, 10_000, 1_000)
        );
        return Ok(());
    }

    println!("Model pricing (USD per 1M tokens)");
    println!("{:<24} {:>10} {:>12}", "Model", "Prompt", "Completion");
    for name in table.models() {
        let rates = table.rates(&name);
        println!(
            "{:<24} {:>10.3} {:>12.3}",
            name, rates.prompt_per_m, rates.completion_per_m
        );
    }
    if config.pricing.prompt_usd_per_1m > 0.0 || config.pricing.completion_usd_per_1m > 0.0 {
        println!(
            "\nOverride in effect for every model: prompt=${} completion=${}",
            config.pricing.prompt_usd_per_1m, config.pricing.completion_usd_per_1m
        );
    }
    Ok(())
}
