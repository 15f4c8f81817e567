//! Synthetic Customer Generator
//!
//! Writes random customer records as JSON lines on stdout, for exercising the
//! scoring API and the threshold search tool.
//!
//! Usage: generate-customers [count] [positive_rate] [--labeled]

use cross_sell_scoring::types::customer::LABEL_FIELD;
use cross_sell_scoring::types::{Categorical, Gender, RawCustomerRecord, VehicleAge, VehicleDamage};
use rand::Rng;
use std::io::{BufWriter, Write};
use tracing::info;

/// Customer generator for testing
struct CustomerGenerator {
    rng: rand::rngs::ThreadRng,
}

impl CustomerGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// Fields every profile shares
    fn base(&mut self) -> RawCustomerRecord {
        let gender = *self.random_choice(Gender::VARIANTS);
        RawCustomerRecord::new()
            .with("gender", gender.label())
            .with("driving_license", u8::from(self.rng.gen_bool(0.98)))
            .with("region_code", self.rng.gen_range(0..53) as f64)
            .with("annual_premium", self.rng.gen_range(2630.0..80000.0_f64).round())
            .with("vintage", self.rng.gen_range(10..300))
    }

    /// A customer who tends to buy: uninsured vehicle with past damage
    fn generate_interested(&mut self) -> RawCustomerRecord {
        let vehicle_age = *self.random_choice(&[VehicleAge::OneToTwoYears, VehicleAge::OverTwoYears]);
        let channel = *self.random_choice(&[26.0, 124.0, 156.0]);
        self.base()
            .with("age", self.rng.gen_range(30..60))
            .with("previously_insured", 0)
            .with("vehicle_age", vehicle_age.label())
            .with("vehicle_damage", VehicleDamage::Yes.label())
            .with("policy_sales_channel", channel)
    }

    /// A customer who tends not to buy: already insured, young vehicle
    fn generate_uninterested(&mut self) -> RawCustomerRecord {
        let damage = *self.random_choice(VehicleDamage::VARIANTS);
        let channel = *self.random_choice(&[152.0, 160.0, 151.0]);
        self.base()
            .with("age", self.rng.gen_range(18..30))
            .with("previously_insured", u8::from(self.rng.gen_bool(0.8)))
            .with("vehicle_age", VehicleAge::UnderOneYear.label())
            .with("vehicle_damage", damage.label())
            .with("policy_sales_channel", channel)
    }

    fn random_choice<'a, T>(&mut self, choices: &'a [T]) -> &'a T {
        &choices[self.rng.gen_range(0..choices.len())]
    }
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the records
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_customers=info".parse()?),
        )
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let labeled = args.iter().any(|a| a == "--labeled");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    let count: u64 = positional.first().and_then(|s| s.parse().ok()).unwrap_or(100);
    let positive_rate: f64 = positional
        .get(1)
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.12)
        .clamp(0.0, 1.0);

    let mut generator = CustomerGenerator::new();
    let mut rng = rand::thread_rng();
    let mut out = BufWriter::new(std::io::stdout().lock());

    let mut interested_count = 0;
    for _ in 0..count {
        let interested = rng.gen_bool(positive_rate);
        let mut record = if interested {
            interested_count += 1;
            generator.generate_interested()
        } else {
            generator.generate_uninterested()
        };
        if labeled {
            record.insert(LABEL_FIELD, u8::from(interested));
        }
        serde_json::to_writer(&mut out, &record)?;
        writeln!(out)?;
    }
    out.flush()?;

    info!(
        count = count,
        interested = interested_count,
        labeled = labeled,
        "Customers generated"
    );

    Ok(())
}
