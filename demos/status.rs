//! Connects to the first TimeFlip around, logs in and prints its state.
//!
//! Pass a device id, name or address to pick a specific device.

use log::LevelFilter;
use timeflip_client::{ClientConfig, TimeFlipManager, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(LevelFilter::Info);

    let config = ClientConfig::default();
    let mut manager = TimeFlipManager::new(config.clone()).await?;

    let mut client = match std::env::args().nth(1) {
        Some(query) => manager.connect(&query).await?,
        None => manager.connect_first().await?,
    };

    println!("Battery level: {}%", client.battery_level().await?);
    println!("Firmware: {}", client.firmware_revision().await?);

    if !client.login(&config.password).await? {
        client.disconnect().await?;
        anyhow::bail!("the device did not accept the password");
    }

    println!("Status: {:?}", client.get_status().await?);
    println!("Facet: {}", client.get_current_facet().await?);
    println!(
        "Calibration version: {}",
        client.get_current_calibration_version().await?
    );

    let mut events = client.setup_facets().await?;
    println!("Flip the device, Ctrl-C to stop");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) if event.paused => println!("{} paused", event.received_at),
                Some(event) => println!("{} facet {}", event.received_at, event.facet),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.disconnect().await?;
    Ok(())
}
