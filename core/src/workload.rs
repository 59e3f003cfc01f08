//! Synthetic transaction streams for the runner and for tests.
//!
//! Each account gets a stable profile (home location, usual spend,
//! favourite counterparties and channel). Fraud is injected as bursts:
//! a run of rapid, large, foreign, night-time transactions to a new
//! counterparty.
//! Output is ordered by timestamp, as the engine expects.

use crate::{
    rng::WorkloadRng,
    transaction::{Channel, Location, Transaction},
    types::Timestamp,
};
use chrono::{Duration, FixedOffset, Timelike};

struct Home {
    country: &'static str,
    region: &'static str,
    lat: f64,
    lon: f64,
    utc_offset_hours: i32,
}

const HOMES: &[Home] = &[
    Home { country: "US", region: "ny", lat: 40.71, lon: -74.01, utc_offset_hours: -5 },
    Home { country: "US", region: "ca", lat: 34.05, lon: -118.24, utc_offset_hours: -8 },
    Home { country: "CA", region: "on", lat: 43.65, lon: -79.38, utc_offset_hours: -5 },
    Home { country: "GB", region: "ldn", lat: 51.51, lon: -0.13, utc_offset_hours: 0 },
    Home { country: "DE", region: "be", lat: 52.52, lon: 13.40, utc_offset_hours: 1 },
    Home { country: "FR", region: "idf", lat: 48.86, lon: 2.35, utc_offset_hours: 1 },
];

const FRAUD_ORIGINS: &[(&str, f64, f64)] = &[("XX", 6.52, 3.38), ("YY", 55.75, 37.62), ("BR", -23.55, -46.63)];

const MERCHANTS: &[&str] = &[
    "grocer", "fuel", "pharmacy", "coffee", "utilities", "transit", "bookshop", "restaurant", "hardware",
];

const USUAL_CHANNELS: &[Channel] = &[Channel::CardPresent, Channel::Online, Channel::Mobile];

#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub accounts: usize,
    pub transactions: usize,
    /// Probability that a given draw starts a fraud burst.
    pub fraud_rate: f64,
    pub burst_length: usize,
    pub start: Timestamp,
}

impl WorkloadConfig {
    pub fn new(accounts: usize, transactions: usize, start: Timestamp) -> Self {
        Self {
            accounts: accounts.max(1),
            transactions,
            fraud_rate: 0.02,
            burst_length: 6,
            start,
        }
    }
}

struct Profile {
    account_id: String,
    home: &'static Home,
    usual_amount: f64,
    counterparties: Vec<&'static str>,
    channel: Channel,
}

/// Generate a deterministic, timestamp-ordered stream.
pub fn generate(config: &WorkloadConfig, seed: u64) -> Vec<Transaction> {
    let mut rng = WorkloadRng::new(seed, 0);
    let profiles: Vec<Profile> = (0..config.accounts)
        .map(|i| {
            let home = rng.pick(HOMES);
            let counterparties = (0..3).map(|_| *rng.pick(MERCHANTS)).collect();
            Profile {
                account_id: format!("acct-{:04}", i + 1),
                home,
                usual_amount: rng.pareto(20.0, 2.5).min(800.0),
                counterparties,
                channel: *rng.pick(USUAL_CHANNELS),
            }
        })
        .collect();

    let mut out = Vec::with_capacity(config.transactions);
    let mut clock = config.start;
    while out.len() < config.transactions {
        clock += Duration::minutes(1 + rng.next_u64_below(20) as i64);
        let profile = rng.pick(&profiles);

        if rng.chance(config.fraud_rate) {
            let (country, lat, lon) = *rng.pick(FRAUD_ORIGINS);
            let offset = night_offset(clock, &mut rng);
            for _ in 0..config.burst_length {
                if out.len() >= config.transactions {
                    break;
                }
                clock += Duration::minutes(1);
                let amount = (profile.usual_amount * (20.0 + rng.next_f64() * 20.0)).round();
                out.push(build(
                    out.len(),
                    profile,
                    clock,
                    amount,
                    Location::country(country).with_coordinates(lat, lon),
                    "unknown-payee",
                    Channel::CardNotPresent,
                    offset,
                ));
            }
            continue;
        }

        let amount = (profile.usual_amount * (0.5 + rng.next_f64())).max(1.0);
        let amount = (amount * 100.0).round() / 100.0;
        let counterparty = *rng.pick(&profile.counterparties);
        let home = profile.home;
        let location = Location::country(home.country)
            .with_region(home.region)
            .with_coordinates(home.lat, home.lon);
        let offset = FixedOffset::east_opt(home.utc_offset_hours * 3600).unwrap_or(*clock.offset());
        out.push(build(out.len(), profile, clock, amount, location, counterparty, profile.channel, offset));
    }
    out
}

/// A zone in which `instant` falls between 01:00 and 03:59 local time.
fn night_offset(instant: Timestamp, rng: &mut WorkloadRng) -> FixedOffset {
    let utc_hour = instant.naive_utc().hour() as i32;
    let target = 1 + rng.next_u64_below(3) as i32;
    let mut shift = target - utc_hour;
    if shift > 12 {
        shift -= 24;
    } else if shift < -11 {
        shift += 24;
    }
    FixedOffset::east_opt(shift * 3600).unwrap_or(*instant.offset())
}

#[allow(clippy::too_many_arguments)]
fn build(
    index: usize,
    profile: &Profile,
    instant: Timestamp,
    amount: f64,
    origin_location: Location,
    counterparty: &str,
    channel: Channel,
    offset: FixedOffset,
) -> Transaction {
    Transaction {
        id: format!("txn-{:08}", index + 1),
        account_id: profile.account_id.clone(),
        amount,
        currency: "USD".into(),
        timestamp: instant.with_timezone(&offset),
        origin_location,
        counterparty: counterparty.to_string(),
        channel,
    }
}
