use std::sync::Arc;

use anyhow::Result;
use shuttle_tracker::auth::LocalAuth;
use shuttle_tracker::config::AppConfig;
use shuttle_tracker::driver::{register_shuttle, DriverSession, DriverSettings};
use shuttle_tracker::location::kafka::KafkaLocationFeed;
use shuttle_tracker::location::{LocationProvider, StaticLocation};
use shuttle_tracker::models::{Account, Coordinates, Shuttle, ShuttleRegistration};
use shuttle_tracker::rider::{RiderDashboard, RiderEvent};
use shuttle_tracker::store::TrackerStore;
use shuttle_tracker::weather::{weather_card, OpenWeatherClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

fn driver_account(driver: String) -> Account {
    Account {
        uid: driver,
        email: String::new(),
        display_name: None,
    }
}

fn describe(shuttle: &Shuttle) -> String {
    let position = match shuttle.position() {
        Some(at) => format!("{:.5}, {:.5}", at.latitude, at.longitude),
        None => "no position yet".to_string(),
    };
    format!(
        "{} [{}] {} | driver {} | seats {} ({:.0}%) | {}",
        shuttle.display_name(),
        shuttle.code,
        shuttle.status.label(),
        shuttle.driver_name,
        shuttle.seats_label(),
        shuttle.load_percent(),
        position
    )
}

pub async fn register(
    store: Arc<dyn TrackerStore>,
    driver: String,
    code: String,
    name: String,
    capacity: i32,
    driver_name: String,
) -> Result<()> {
    let account = driver_account(driver);
    let registration = ShuttleRegistration {
        code,
        name,
        capacity,
        driver_name,
    };
    let shuttle = register_shuttle(store.as_ref(), Some(&account), registration).await?;
    println!("Registered: {}", describe(&shuttle));
    Ok(())
}

#[derive(Debug, PartialEq)]
enum ConsoleCommand<'a> {
    Blank,
    Quit,
    Start,
    End,
    Board,
    Alight,
    Status,
    Alert(&'a str),
}

fn parse_command(line: &str) -> Option<ConsoleCommand<'_>> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let command = match (word, rest) {
        ("", _) => ConsoleCommand::Blank,
        ("alert", text) => ConsoleCommand::Alert(text),
        (_, rest) if !rest.is_empty() => return None,
        ("quit" | "exit", _) => ConsoleCommand::Quit,
        ("start", _) => ConsoleCommand::Start,
        ("end", _) => ConsoleCommand::End,
        ("+", _) => ConsoleCommand::Board,
        ("-", _) => ConsoleCommand::Alight,
        ("status", _) => ConsoleCommand::Status,
        _ => return None,
    };
    Some(command)
}

pub async fn drive(
    config: &AppConfig,
    store: Arc<dyn TrackerStore>,
    driver: String,
    device: Option<String>,
    fixed: Option<(f64, f64)>,
) -> Result<()> {
    let location: Arc<dyn LocationProvider> = match (device, fixed) {
        (Some(device), _) => Arc::new(KafkaLocationFeed::start(config, &device)?),
        (None, Some((latitude, longitude))) => Arc::new(StaticLocation::new(Coordinates {
            latitude,
            longitude,
        })),
        (None, None) => {
            warn!("No GPS device or fixed position given; tracking disabled");
            Arc::new(StaticLocation::denied())
        }
    };

    let auth = Arc::new(LocalAuth::signed_in(driver_account(driver)));
    let mut session = DriverSession::open(
        auth,
        store,
        location,
        DriverSettings::from_config(config),
    )
    .await?;
    println!("{}", describe(session.shuttle()));
    println!("Commands: start, end, +, -, alert <text>, status, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else { break };

        let outcome = match parse_command(&line) {
            None => {
                println!("Unknown command: {}", line.trim());
                continue;
            }
            Some(ConsoleCommand::Blank) => continue,
            Some(ConsoleCommand::Quit) => break,
            Some(ConsoleCommand::Start) => session.start_trip().await,
            Some(ConsoleCommand::End) => session.end_trip().await,
            Some(ConsoleCommand::Board) => session.update_occupancy(1).await.map(|_| ()),
            Some(ConsoleCommand::Alight) => session.update_occupancy(-1).await.map(|_| ()),
            Some(ConsoleCommand::Status) => Ok(()),
            Some(ConsoleCommand::Alert(text)) => {
                session.set_alert_draft(text);
                session.send_alert().await.map(|alert| {
                    println!("Alert sent: {}", alert.message);
                })
            }
        };

        match outcome {
            Ok(()) => {
                println!("{}", describe(session.shuttle()));
                if session.is_tracking() {
                    println!("Tracking location");
                }
            }
            Err(e) => println!("{}", e),
        }
    }

    session.close().await;
    Ok(())
}

pub async fn watch(config: &AppConfig, store: Arc<dyn TrackerStore>) -> Result<()> {
    let mut dashboard = RiderDashboard::new(store, config.alert_feed_limit);

    loop {
        let event = tokio::select! {
            event = dashboard.next_event() => event,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };

        match event {
            Some(RiderEvent::ShuttlesChanged) => {
                let shuttles = dashboard.active_shuttles();
                if shuttles.is_empty() {
                    println!("No active shuttles");
                }
                for shuttle in shuttles {
                    println!("{}", describe(shuttle));
                }
            }
            Some(RiderEvent::AlertsChanged { new }) => {
                for alert in dashboard.feed().alerts().iter().take(new) {
                    println!(
                        "[{}] {}: {}",
                        alert.created_at.format("%H:%M"),
                        alert.shuttle_name,
                        alert.message
                    );
                }
                if new > 0 {
                    println!("{} unseen alert(s)", dashboard.feed().unseen());
                }
            }
            Some(RiderEvent::QueryFailed(e)) => error!("Live query failed: {}", e),
            None => break,
        }
    }

    Ok(())
}

pub async fn history(store: Arc<dyn TrackerStore>, shuttle: &str, limit: usize) -> Result<()> {
    let positions = store.latest_positions(shuttle, limit).await?;
    if positions.is_empty() {
        println!("No positions recorded for {}", shuttle);
    }
    for sample in positions {
        println!(
            "{} {:.6}, {:.6}",
            sample.captured_at.to_rfc3339(),
            sample.latitude,
            sample.longitude
        );
    }
    Ok(())
}

pub async fn weather(config: &AppConfig, lat: f64, lon: f64) {
    let here = StaticLocation::new(Coordinates {
        latitude: lat,
        longitude: lon,
    });
    let client = OpenWeatherClient::new(config.weather_api_url.as_str(), config.weather_api_key.as_str());

    match weather_card(&here, &client).await {
        Some(current) => println!(
            "{}: {:.1}°C, {}% humidity, {}",
            current.city,
            current.temperature_c,
            current.humidity,
            current.headline()
        ),
        None => println!("Weather data unavailable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_console_commands() {
        assert_eq!(parse_command("  start "), Some(ConsoleCommand::Start));
        assert_eq!(parse_command("+"), Some(ConsoleCommand::Board));
        assert_eq!(parse_command(""), Some(ConsoleCommand::Blank));
        assert_eq!(
            parse_command("alert  Leaving in 2 minutes "),
            Some(ConsoleCommand::Alert("Leaving in 2 minutes"))
        );
        // Blank text is left for the alert validation to reject.
        assert_eq!(parse_command("alert"), Some(ConsoleCommand::Alert("")));
    }

    #[test]
    fn test_glued_or_unknown_words_are_rejected() {
        assert_eq!(parse_command("alertfoo"), None);
        assert_eq!(parse_command("start now"), None);
        assert_eq!(parse_command("board"), None);
    }
}
