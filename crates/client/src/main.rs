//! Officer terminal binary.
//!
//! Wires the lifecycle controller to the HTTP store and the WebSocket feed,
//! renders controller notifications to stdout, and drives the controller
//! from stdin commands:
//!
//! ```text
//! input <value>            simulate typing into the appointment field
//! claim <appointment-no>   submit a claim
//! serials <id> <good> [spoiled]
//! name <id> <full name>
//! image <id> <url>
//! receipt <id>
//! unlock <id>
//! list | refresh | clear | quit
//! ```

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cardesk_client::commands::Command;
use cardesk_client::config::ClientConfig;
use cardesk_client::controller::ReservationController;
use cardesk_client::feed::run_feed;
use cardesk_client::http::ApiStore;
use cardesk_client::ui::UiEvent;
use cardesk_core::presence::PresenceAssessment;
use cardesk_db::models::reservation::{CreateReservation, UpdateDetails, UpdateSerials};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardesk_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env();
    tracing::info!(
        officer = %config.officer.name,
        role = %config.officer.role,
        api = %config.api_url,
        "Terminal starting"
    );

    let store =
        Arc::new(ApiStore::new(&config.api_url, &config.api_token).expect("HTTP client"));

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let today = chrono::Utc::now().date_naive();
    let (controller, handle) = ReservationController::new(
        store,
        config.officer.clone(),
        today,
        outbound_tx,
        ui_tx,
    );
    let cancel = controller.cancellation_token();

    let feed_task = tokio::spawn(run_feed(
        config.ws_url(),
        config.api_token.clone(),
        handle.clone(),
        outbound_rx,
        cancel.clone(),
    ));
    let render_task = tokio::spawn(render(ui_rx));
    let controller_task = tokio::spawn(controller.run());

    // Initial sync; the feed's Connected event re-syncs on every reconnect.
    handle.send(Command::Refresh);

    read_stdin(&handle).await;

    handle.send(Command::Shutdown);
    cancel.cancel();
    let _ = tokio::join!(controller_task, feed_task, render_task);
}

/// Parse stdin lines into controller commands until EOF or `quit`.
async fn read_stdin(handle: &cardesk_client::controller::ControllerHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else { continue };
        let rest: Vec<&str> = parts.collect();

        match (verb, rest.as_slice()) {
            ("quit" | "exit", _) => return,
            ("input", args) if !args.is_empty() => handle.send(Command::InputChanged {
                value: args.join(" "),
            }),
            ("clear", _) => handle.send(Command::InputCleared),
            ("claim", [appointment_no]) => {
                handle.send(Command::InputChanged {
                    value: (*appointment_no).to_string(),
                });
                handle.send(Command::SubmitCreate {
                    input: CreateReservation {
                        appointment_no: (*appointment_no).to_string(),
                        request_no: None,
                        passport_no: None,
                        foreigner_name: None,
                    },
                });
            }
            ("serials", [id, good, rest @ ..]) => match id.parse() {
                Ok(id) => handle.send(Command::AttachSerials {
                    id,
                    input: UpdateSerials {
                        sn_good: (*good).to_string(),
                        sn_spoiled: rest.first().map(|s| (*s).to_string()),
                    },
                }),
                Err(_) => println!("! serials: <id> must be a number"),
            },
            ("name", [id, name @ ..]) if !name.is_empty() => match id.parse() {
                Ok(id) => handle.send(Command::EditDetails {
                    id,
                    input: UpdateDetails {
                        foreigner_name: Some(name.join(" ")),
                        ..Default::default()
                    },
                }),
                Err(_) => println!("! name: <id> must be a number"),
            },
            ("image", [id, url]) => match id.parse() {
                Ok(id) => handle.send(Command::AttachImage {
                    id,
                    url: (*url).to_string(),
                }),
                Err(_) => println!("! image: <id> must be a number"),
            },
            ("receipt", [id]) => match id.parse() {
                Ok(id) => handle.send(Command::GenerateReceipt { id }),
                Err(_) => println!("! receipt: <id> must be a number"),
            },
            ("unlock", [id]) => match id.parse() {
                Ok(id) => handle.send(Command::Unlock { id }),
                Err(_) => println!("! unlock: <id> must be a number"),
            },
            ("list" | "refresh", _) => handle.send(Command::Refresh),
            _ => println!("! unknown command: {line}"),
        }
    }
}

/// Render controller notifications to stdout.
async fn render(mut ui: mpsc::UnboundedReceiver<UiEvent>) {
    while let Some(event) = ui.recv().await {
        match event {
            UiEvent::CacheUpdated { rows } => {
                println!("-- today: {} reservation(s) --", rows.len());
                for r in rows {
                    println!(
                        "  #{} {} [{}] by {}{}",
                        r.id,
                        r.appointment_no,
                        r.status,
                        r.officer_name,
                        r.sn_good
                            .as_deref()
                            .map(|sn| format!(" sn={sn}"))
                            .unwrap_or_default(),
                    );
                }
            }
            UiEvent::ClaimWon { reservation } => {
                println!(
                    "* claimed {} (#{})",
                    reservation.appointment_no, reservation.id
                );
            }
            UiEvent::ClaimLost {
                appointment_no,
                winner,
            } => match winner {
                Some(w) => println!(
                    "! {} is already held by {}{}",
                    w.appointment_no,
                    w.officer_name,
                    w.sn_good
                        .as_deref()
                        .map(|sn| format!(" (sn {sn})"))
                        .unwrap_or_default(),
                ),
                None => println!("! {appointment_no} is already held"),
            },
            UiEvent::ReceiptIssued {
                reservation,
                receipt,
            } => {
                println!(
                    "* receipt #{} issued for {}",
                    receipt.id, reservation.appointment_no
                );
            }
            UiEvent::ReceiptBlocked { blockers } => {
                println!("! receipt blocked:");
                for b in blockers {
                    println!("    - {b}");
                }
            }
            UiEvent::ActionFailed {
                action,
                message,
                retryable,
            } => {
                let hint = if retryable { " (try again)" } else { "" };
                println!("! {action} failed: {message}{hint}");
            }
            UiEvent::Presence(assessment) => match assessment {
                PresenceAssessment::Clear => {}
                PresenceAssessment::OthersActive { count } => {
                    println!("~ {count} other officer(s) entering appointments");
                }
                PresenceAssessment::ImminentCollision {
                    officer_name,
                    appointment_no,
                } => {
                    println!(
                        "!! {officer_name} is typing {appointment_no} RIGHT NOW -- you will collide"
                    );
                }
            },
            UiEvent::SubmitEnabled(enabled) => {
                if !enabled {
                    println!("~ claim in flight...");
                }
            }
            UiEvent::FeedOnline(online) => {
                println!("~ live feed {}", if online { "online" } else { "offline" });
            }
        }
    }
}
