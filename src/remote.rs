// Remote "update" commands over MQTT

use anyhow::Result;
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};
use std::sync::{Arc, Mutex};
use std::thread;
use update_core::{command, RemoteCommand, UpdateTrigger};

/// Keeps the broker session alive. Commands arrive on a background thread
/// and only ever touch the scheduler through its trigger.
pub struct RemoteCommands {
    _client: Arc<Mutex<EspMqttClient<'static>>>,
}

impl RemoteCommands {
    pub fn start(url: &str, topic: &str, trigger: UpdateTrigger) -> Result<Self> {
        log::info!("Connecting to command broker {}", url);

        let conf = MqttClientConfiguration {
            client_id: Some("esp32-autoupdate"),
            ..Default::default()
        };
        let (client, mut conn) = EspMqttClient::new(url, &conf)?;
        let client = Arc::new(Mutex::new(client));

        let subscriber = client.clone();
        let topic = topic.to_string();
        thread::Builder::new()
            .name("mqtt-cmd".to_string())
            .stack_size(6144)
            .spawn(move || loop {
                match conn.next() {
                    Ok(event) => match event.payload() {
                        // Subscriptions do not survive a reconnect
                        EventPayload::Connected(_) => {
                            let result = subscriber
                                .lock()
                                .map_err(|_| anyhow::anyhow!("mqtt client lock poisoned"))
                                .and_then(|mut c| Ok(c.subscribe(&topic, QoS::AtLeastOnce)?));
                            match result {
                                Ok(_) => log::info!("Subscribed to {}", topic),
                                Err(e) => log::warn!("Subscribe to {} failed: {:?}", topic, e),
                            }
                        }
                        EventPayload::Received { data, .. } => handle_payload(data, &trigger),
                        EventPayload::Disconnected => log::warn!("Command broker disconnected"),
                        _ => {}
                    },
                    Err(e) => {
                        log::warn!("MQTT connection closed: {:?}", e);
                        break;
                    }
                }
            })?;

        Ok(Self { _client: client })
    }
}

fn handle_payload(data: &[u8], trigger: &UpdateTrigger) {
    match command::route(data, trigger) {
        Ok(RemoteCommand::Update) => log::info!("Update check requested remotely"),
        Ok(RemoteCommand::Status) => log::info!("Status requested (not published by this firmware)"),
        Ok(RemoteCommand::Unknown(name)) => log::warn!("Ignoring unknown command '{}'", name),
        Err(e) => log::warn!("Bad command payload: {}", e),
    }
}
