//! Xena chassis inventory tool
//!
//! Connects to the chassis listed in the settings file, prints their
//! modules and ports, and optionally reserves ports to list their streams
//! and save their configuration. With no chassis configured it runs
//! against a virtual chassis.

mod settings;

use std::path::{Path, PathBuf};

use anyhow::Context;
use settings::{ChassisEntry, Settings};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xena_manager::{ChassisHandle, PortHandle, Session};

const VIRTUAL_ADDRESS: &str = "127.0.0.1";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "xena_inventory=info,xena_protocol=info,xena_channel=info,xena_manager=info,xena_sim=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut settings = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => Settings::load_from(&path)
            .with_context(|| format!("reading settings from {}", path.display()))?,
        None => Settings::load(),
    };

    if settings.chassis.is_empty() {
        info!("No chassis configured, using a virtual chassis");
        settings.session.dummy = true;
        let mut entry = ChassisEntry::new(VIRTUAL_ADDRESS);
        entry.password = settings.session.virtual_chassis.password.clone();
        settings.chassis.push(entry);
    }

    let mut session = Session::cli(settings.session.clone());
    let result = run(&mut session, &settings).await;
    session.disconnect(settings.release_on_exit).await?;
    result
}

async fn run(session: &mut Session, settings: &Settings) -> anyhow::Result<()> {
    for entry in &settings.chassis {
        session
            .add_chassis(&entry.address, entry.port, &entry.password)
            .await
            .with_context(|| format!("connecting to {}:{}", entry.address, entry.port))?;
    }
    session.inventory().await?;

    for (address, chassis) in session.chassis_list() {
        print_chassis(session, &address, chassis).await?;
    }

    if settings.ports.is_empty() {
        return Ok(());
    }

    let locations: Vec<&str> = settings.ports.iter().map(String::as_str).collect();
    let ports = session
        .reserve_ports(&locations, settings.force, false)
        .await?;
    for port in ports {
        print_streams(session, port).await?;
        if let Some(dir) = &settings.save_dir {
            save_port(session, port, dir).await?;
        }
    }
    Ok(())
}

async fn print_chassis(
    session: &mut Session,
    address: &str,
    chassis: ChassisHandle,
) -> anyhow::Result<()> {
    let name = session.cached_attribute(chassis, "c_name").unwrap_or("?");
    let model = session.cached_attribute(chassis, "c_model").unwrap_or("?");
    println!("{} {} ({})", address, name, model);

    let modules = session.chassis(chassis).modules().await?;
    for (index, module) in modules {
        let model = session.cached_attribute(module, "m_model").unwrap_or("-");
        println!("  module {} {}", index, model);

        let ports = session.module(module).ports().await?;
        for (index, port) in ports {
            let speed = session.cached_attribute(port, "p_speed").unwrap_or("?");
            let reservation = session
                .cached_attribute(port, "p_reservation")
                .unwrap_or("?");
            println!("    port {} speed {} {}", index, speed, reservation);
        }
    }
    Ok(())
}

async fn print_streams(session: &mut Session, port: PortHandle) -> anyhow::Result<()> {
    let address = session.port(port).address()?;
    let streams = session.port(port).streams().await?;
    println!("{} {} streams", address, streams.len());

    for (index, stream) in streams {
        let mut view = session.stream(stream);
        let comment = view.comment().await?;
        let tpld = view.tpld_id().await?;
        let state = view.state().await?;
        match tpld {
            Some(tpld) => println!("  [{}] {} tpld {} {}", index, state, tpld, comment),
            None => println!("  [{}] {} {}", index, state, comment),
        }
    }
    Ok(())
}

async fn save_port(session: &mut Session, port: PortHandle, dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    let object = session.object(port)?;
    let file_name = format!("{}_{}.xpc", object.chassis(), object.location()).replace('/', "-");
    let path = dir.join(file_name);
    if let Err(e) = session.port(port).save_config(&path).await {
        warn!("Saving {} failed: {}", path.display(), e);
    }
    Ok(())
}
