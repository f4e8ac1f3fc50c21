use beacon_alarm::util::init_tracing;
use beacon_alarm::{AlarmEventKind, AlarmService, BeaconId, Config, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

const CONFIG: &str = r#"{
    "floors": [
        {"id": "L1", "name": "Ground floor", "macro_sensor_eui": "a84041000181c9c1", "bluetooth_gateway_eui": "ac233ffffe0a0001"},
        {"id": "L2", "name": "First floor", "macro_sensor_eui": "a84041000181c9c2", "bluetooth_gateway_eui": "ac233ffffe0a0002"}
    ],
    "watchlist": [
        {"id": "001064B0", "label": "Forklift", "home_floor_id": "L1"},
        {"id": "001064AF", "label": "Pallet jack"}
    ],
    "safe_threshold": -60,
    "alarm_threshold": -70,
    "debounce": 2,
    "command_spacing": 0.2,
    "silence_on_first_sighting": false
}"#;

fn gateway_uplink(gateway: &str, beacon: &str, rssi: i16) -> String {
    format!(
        r#"{{"deviceInfo":{{"devEui":"{}"}},"fPort":1,"object":{{"beacon1":"{}","rssi1":{}}}}}"#,
        gateway, beacon, rssi
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info")?;

    let config = Config::from_json_str(CONFIG)?;
    let application_id = config.application_id.clone();
    println!("Tracking {} beacons on {} floors", config.watchlist.len(), config.floors.len());

    let (downlink_tx, mut downlink_rx) = mpsc::channel(64);
    let service = AlarmService::new(&config, downlink_tx)?;
    let bus = service.handle();
    let mut events = service.subscribe();
    let running = tokio::spawn(service.run());

    // Stand-in for the network server: print what would be published
    let printer = tokio::spawn(async move {
        while let Some(downlink) = downlink_rx.recv().await {
            let envelope = downlink.to_envelope();
            match envelope.to_json() {
                Ok(json) => println!("-> {} {}", envelope.topic(&application_id), json),
                Err(e) => eprintln!("Encoding error: {}", e),
            }
        }
    });

    let watcher = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.kind {
                AlarmEventKind::StateChanged { .. } => continue,
                kind => println!("{} ({}): {:?}", event.label, event.beacon, kind),
            }
        }
    });

    println!("\nForklift on its home floor");
    bus.publish_envelope_json(&gateway_uplink("ac233ffffe0a0001", "001064B0", -45)).await?;
    sleep(Duration::from_secs(1)).await;

    println!("\nForklift heard on the first floor");
    for _ in 0..4 {
        bus.publish_envelope_json(&gateway_uplink("ac233ffffe0a0002", "001064B0", -45)).await?;
        sleep(Duration::from_secs(1)).await;
    }

    println!("\nBuzzer acknowledges the alarm sequence");
    for seq in 0..3 {
        bus.acknowledge(seq).await?;
    }

    println!("\nForklift back home");
    bus.publish_envelope_json(&gateway_uplink("ac233ffffe0a0001", "001064B0", -45)).await?;
    sleep(Duration::from_secs(1)).await;

    println!("\nPallet jack drifting away, then operator override and clear");
    bus.publish_gateway_json(r#"{"beacon1":"001064AF","rssi1":-66}"#).await?;
    bus.manual_override(BeaconId::new(0x64AF)).await?;
    sleep(Duration::from_secs(1)).await;
    bus.manual_clear(BeaconId::new(0x64AF)).await?;
    sleep(Duration::from_secs(1)).await;

    drop(bus);
    if let Ok(result) = running.await {
        result?;
    }
    let _ = printer.await;
    watcher.abort();
    Ok(())
}
