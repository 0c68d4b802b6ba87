//! Command implementations. Each prints either a text table or one JSON document.

use std::sync::Arc;

use eyre::{Result, WrapErr};
use mpg_config::Config;
use mpg_core::catalog::Catalog;
use mpg_core::persist::IMAGE_LEN;
use mpg_core::trips::TripId;
use mpg_core::vm::codec::{decode, encode, encoded_len};
use mpg_core::vm::{Program, ProgramTable};
use mpg_core::{Arithmetic, Fixed, FuelComputer, Quantity, Setting, Trip};
use mpg_hardware::{DriveProfile, DriveSimulator, FileEeprom, MemoryEeprom, SimStats, SimulatedTimer};
use serde_json::{Map, Value, json};

use crate::error_fmt::CliError;

/// Quantities shown for each trip by `simulate`.
const DASHBOARD: [Quantity; 9] = [
    Quantity::FuelEcon,
    Quantity::Speed,
    Quantity::Distance,
    Quantity::FuelUsed,
    Quantity::FuelRate,
    Quantity::EngineSpeed,
    Quantity::EngineRunTime,
    Quantity::TimeToEmpty,
    Quantity::DistanceToEmpty,
];

/// Assemble a computer for `cfg`, on the configured image or a scratch store.
pub fn open_computer(cfg: &Config) -> Result<FuelComputer> {
    let builder = FuelComputer::builder().with_config(cfg);
    let mut computer = match cfg.storage.image.as_deref() {
        Some(path) => builder
            .with_storage(
                FileEeprom::open(path, IMAGE_LEN)
                    .wrap_err_with(|| format!("open storage image {path}"))?,
            )
            .build()?,
        None => builder.with_storage(MemoryEeprom::new(IMAGE_LEN)).build()?,
    };
    // a populated store already holds its fuel factor
    if computer.first_boot() && cfg.vehicle.micros_per_quantity.is_none() {
        computer.derive_fuel_factor()?;
    }
    Ok(computer)
}

fn parse_trip(name: &str) -> Result<TripId> {
    TripId::parse(name).ok_or_else(|| {
        CliError::UnknownName {
            kind: "trip",
            name: name.to_owned(),
        }
        .into()
    })
}

fn parse_quantity(name: &str) -> Result<Quantity> {
    Quantity::parse(name).ok_or_else(|| {
        CliError::UnknownName {
            kind: "quantity",
            name: name.to_owned(),
        }
        .into()
    })
}

fn parse_program(name: &str) -> Result<Program> {
    Program::ALL
        .iter()
        .copied()
        .find(|p| p.name() == name)
        .ok_or_else(|| {
            CliError::UnknownName {
                kind: "program",
                name: name.to_owned(),
            }
            .into()
        })
}

fn fixed_json(value: Fixed) -> Value {
    match value {
        Fixed::Value(v) => json!(v),
        Fixed::Overflow => Value::Null,
    }
}

fn trip_json(t: &Trip) -> Value {
    json!({
        "vss_pulses": t.vss_pulses,
        "vss_cycles": t.vss_cycles,
        "injector_pulses": t.injector_pulses,
        "injector_cycles": t.injector_cycles,
        "injector_open_cycles": t.injector_open_cycles,
    })
}

// ── simulate ────────────────────────────────────────────────────────────────

/// Arguments of `mpg simulate`.
#[derive(Debug, Clone)]
pub struct SimulateArgs {
    pub speed: f64,
    pub rpm: f64,
    pub pulse_us: f64,
    pub seconds: u32,
    pub park: u32,
    pub trips: Vec<String>,
    pub save: Option<usize>,
}

struct Drive<'a> {
    computer: &'a mut FuelComputer,
    isr: mpg_core::isr::Interrupts<Arc<SimulatedTimer>>,
    sim: DriveSimulator,
    step: u64,
    stats: SimStats,
    cycles: u64,
}

impl Drive<'_> {
    fn run(&mut self, seconds: u32) -> Result<()> {
        let steps = u64::from(seconds) * u64::from(self.computer.cycles_per_second()) / self.step;
        for _ in 0..steps {
            let s = self.sim.advance(&self.isr, self.step);
            self.stats.ticks += s.ticks;
            self.stats.vss_edges += s.vss_edges;
            self.stats.injector_pulses += s.injector_pulses;
            if self.computer.poll()?.is_some() {
                self.cycles += 1;
            }
        }
        Ok(())
    }
}

pub fn simulate(cfg: &Config, args: &SimulateArgs, as_json: bool) -> Result<()> {
    let trips = if args.trips.is_empty() {
        vec![TripId::Instant, TripId::Current, TripId::Tank]
    } else {
        args.trips.iter().map(|t| parse_trip(t)).collect::<Result<Vec<_>>>()?
    };

    let mut computer = open_computer(cfg)?;
    let timer = Arc::new(SimulatedTimer::new(computer.tick_cycles()));
    let isr = computer.interrupts(Arc::clone(&timer));
    let profile = DriveProfile::steady(
        args.speed,
        computer.settings().get(Setting::PulsesPerDistance),
        args.rpm,
        computer.settings().get(Setting::CrankRevs),
        args.pulse_us,
    );
    let sim = DriveSimulator::new(timer, computer.cycles_per_second(), profile);
    let step = u64::from(computer.tick_cycles());
    tracing::info!(speed = args.speed, rpm = args.rpm, pulse_us = args.pulse_us, seconds = args.seconds, "simulating");

    let mut drive = Drive {
        computer: &mut computer,
        isr,
        sim,
        step,
        stats: SimStats::default(),
        cycles: 0,
    };
    drive.run(args.seconds)?;
    if args.park > 0 {
        drive.sim.set_profile(DriveProfile::PARKED);
        drive.run(args.park)?;
    }
    let (stats, cycles) = (drive.stats, drive.cycles);

    if let Some(slot) = args.save {
        computer.save_trip(TripId::Tank, slot)?;
    }

    let mut rows = Vec::new();
    for &trip in &trips {
        for q in DASHBOARD {
            let e = computer.evaluate(q, trip)?;
            let text = computer.format(&e)?;
            rows.push((trip, q, e, text));
        }
    }

    if as_json {
        let mut by_trip = Map::new();
        for (trip, q, e, text) in &rows {
            let entry = by_trip
                .entry(trip.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(m) = entry {
                m.insert(
                    q.name().to_owned(),
                    json!({ "raw": e.raw, "value": fixed_json(e.value), "text": text.trim() }),
                );
            }
        }
        let history: Vec<Value> = computer.fe_history().map(fixed_json).collect();
        let doc = json!({
            "ticks": stats.ticks,
            "vss_edges": stats.vss_edges,
            "injector_pulses": stats.injector_pulses,
            "loop_cycles": cycles,
            "awake": computer.capture().is_awake(),
            "fe_history": history,
            "trips": by_trip,
        });
        println!("{doc}");
    } else {
        println!(
            "simulated {}s: {} ticks, {} vss edges, {} injector pulses, {} loop cycles",
            args.seconds + args.park,
            stats.ticks,
            stats.vss_edges,
            stats.injector_pulses,
            cycles
        );
        println!("{:<14} {:<22} {:>10}", "trip", "quantity", "value");
        for (trip, q, _, text) in &rows {
            println!("{:<14} {:<22} {:>10}", trip.to_string(), q.name(), text);
        }
    }
    Ok(())
}

// ── evaluate ────────────────────────────────────────────────────────────────

/// Arguments of `mpg evaluate`.
#[derive(Debug, Clone)]
pub struct EvaluateArgs {
    pub quantity: String,
    pub trip: String,
    pub counters: Trip,
    pub tank_open_cycles: Option<u64>,
}

pub fn evaluate(cfg: &Config, args: &EvaluateArgs, as_json: bool) -> Result<()> {
    let quantity = parse_quantity(&args.quantity)?;
    let trip = parse_trip(&args.trip)?;
    let mut computer = open_computer(cfg)?;
    *computer.trips_mut().get_mut(trip) = args.counters;
    if let Some(open) = args.tank_open_cycles {
        computer.trips_mut().get_mut(TripId::Tank).injector_open_cycles = open;
    }

    let e = computer.evaluate(quantity, trip)?;
    let text = computer.format(&e)?;
    if as_json {
        let doc = json!({
            "quantity": quantity.name(),
            "trip": trip.to_string(),
            "raw": e.raw,
            "value": fixed_json(e.value),
            "overflow": e.value.is_overflow(),
            "text": text.trim(),
        });
        println!("{doc}");
    } else {
        println!("{quantity} ({trip}): {}", text.trim());
    }
    Ok(())
}

// ── programs ────────────────────────────────────────────────────────────────

pub fn programs(cfg: &Config, program: Option<&str>, as_json: bool) -> Result<()> {
    let catalog = Catalog::new(cfg.engine.arithmetic.into());

    let Some(name) = program else {
        let mut list = Vec::new();
        for &p in Program::ALL {
            let code = catalog.program(p);
            let bytes = encode(code).wrap_err_with(|| format!("encode {p}"))?;
            list.push((p, code.len(), bytes.len()));
        }
        if as_json {
            let doc: Vec<Value> = list
                .iter()
                .map(|(p, n, b)| json!({ "name": p.name(), "instructions": n, "bytes": b }))
                .collect();
            println!("{}", Value::Array(doc));
        } else {
            println!("{:<26} {:>6} {:>6}", "program", "instr", "bytes");
            for (p, n, b) in list {
                println!("{:<26} {n:>6} {b:>6}", p.name());
            }
        }
        return Ok(());
    };

    let p = parse_program(name)?;
    let code = catalog.program(p);
    let bytes = encode(code).wrap_err_with(|| format!("encode {p}"))?;
    // a program that does not survive its own wire form would be a catalog bug
    let back = decode(&bytes).wrap_err_with(|| format!("decode {p}"))?;
    if back != code {
        eyre::bail!("{p} does not round-trip through the codec");
    }

    let mut offset = 0;
    let mut lines = Vec::new();
    for ins in code {
        let len = encoded_len(*ins);
        let hex: Vec<String> = bytes
            .get(offset..offset + len)
            .unwrap_or_default()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        lines.push((offset, hex.join(" "), ins.to_string()));
        offset += len;
    }

    if as_json {
        let doc: Vec<Value> = lines
            .iter()
            .map(|(o, h, m)| json!({ "offset": o, "hex": h, "mnemonic": m }))
            .collect();
        println!("{}", json!({ "name": p.name(), "code": doc }));
    } else {
        println!("{} ({} instructions, {} bytes)", p.name(), code.len(), bytes.len());
        for (o, h, m) in lines {
            println!("  {o:04x}  {h:<12} {m}");
        }
    }
    Ok(())
}

// ── trips ───────────────────────────────────────────────────────────────────

pub fn trips(cfg: &Config, as_json: bool) -> Result<()> {
    let computer = open_computer(cfg)?;
    let slots = computer.saved_trips()?;
    if as_json {
        let doc: Vec<Value> = slots
            .iter()
            .map(|(slot, entry)| match entry {
                Some((stamp, t)) => json!({ "slot": slot, "stamp": stamp, "trip": trip_json(t) }),
                None => json!({ "slot": slot, "stamp": null, "trip": null }),
            })
            .collect();
        println!("{}", Value::Array(doc));
        return Ok(());
    }
    for (slot, entry) in slots {
        match entry {
            Some((stamp, t)) => println!(
                "slot {slot}: saved at {stamp}s, {} vss pulses, {} injector pulses, {} open cycles",
                t.vss_pulses, t.injector_pulses, t.injector_open_cycles
            ),
            None => println!("slot {slot}: empty"),
        }
    }
    Ok(())
}

// ── settings ────────────────────────────────────────────────────────────────

fn parse_assignment(s: &str) -> Result<(Setting, u32)> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| CliError::BadAssignment(s.to_owned()))?;
    let setting = Setting::parse(name.trim()).ok_or_else(|| CliError::UnknownName {
        kind: "setting",
        name: name.trim().to_owned(),
    })?;
    let value = value
        .trim()
        .parse()
        .map_err(|_| CliError::BadAssignment(s.to_owned()))?;
    Ok((setting, value))
}

pub fn settings(cfg: &Config, assignments: &[String], as_json: bool) -> Result<()> {
    let mut computer = open_computer(cfg)?;
    for a in assignments {
        let (setting, value) = parse_assignment(a)?;
        computer.set_setting(setting, value)?;
    }

    let mut values = Vec::with_capacity(Setting::ALL.len());
    for s in Setting::ALL {
        let v = computer.run_program(Program::ReadSetting, s as u8)?;
        values.push((s, v));
    }
    if as_json {
        let doc: Map<String, Value> = values
            .iter()
            .map(|(s, v)| (s.name().to_owned(), json!(v)))
            .collect();
        println!("{}", Value::Object(doc));
    } else {
        for (s, v) in values {
            println!("{:<24} {v:>12}", s.name());
        }
    }
    Ok(())
}

// ── self-check ──────────────────────────────────────────────────────────────

/// Counters that drive every program through its non-trivial path.
const SAMPLE: Trip = Trip {
    vss_pulses: 10_016,
    injector_pulses: 2_400,
    vss_cycles: 187_500_000,
    injector_cycles: 187_400_000,
    injector_open_cycles: 484_375,
};

pub fn self_check(cfg: &Config, as_json: bool) -> Result<()> {
    let mut faults = 0;
    let mut runs = Vec::new();
    for arith in [Arithmetic::Native, Arithmetic::Primitive] {
        let catalog = Catalog::new(arith);
        catalog
            .validate()
            .map_err(|f| eyre::eyre!("{arith:?} catalog: {f}"))?;
        for &p in Program::ALL {
            let code = catalog.program(p);
            if decode(&encode(code)?)? != code {
                tracing::error!(program = %p, ?arith, "codec round trip changed the program");
                faults += 1;
            }
        }

        for metric in [false, true] {
            let mut c = FuelComputer::builder()
                .with_config(cfg)
                .with_arithmetic(arith)
                .with_restore(false)
                .with_storage(MemoryEeprom::new(IMAGE_LEN))
                .build()?;
            if c.settings().metric() != metric {
                c.set_setting(Setting::MetricMode, u32::from(metric))?;
            }
            for trip in TripId::SELECTABLE {
                *c.trips_mut().get_mut(trip) = SAMPLE;
            }
            let failures = c.check_catalog();
            for f in &failures {
                tracing::error!(program = %f.program, index = f.index, input = f.input, error = %f.error, "catalog fault");
            }
            faults += failures.len();
            runs.push((arith, metric, failures.len()));
        }
    }

    if as_json {
        let doc: Vec<Value> = runs
            .iter()
            .map(|(a, m, n)| json!({ "arithmetic": format!("{a:?}").to_lowercase(), "metric": m, "faults": n }))
            .collect();
        println!("{}", json!({ "ok": faults == 0, "runs": doc }));
    } else {
        for (a, m, n) in &runs {
            let units = if *m { "metric" } else { "us" };
            println!("{:<10} {units:<7} {n} fault(s)", format!("{a:?}").to_lowercase());
        }
    }
    if faults > 0 {
        return Err(CliError::SelfCheckFailed(faults).into());
    }
    if !as_json {
        println!("self-check ok");
    }
    Ok(())
}
