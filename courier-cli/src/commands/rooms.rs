use anyhow::{bail, Result};
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use courier_core::{ChatMessage, Identity, RoomSummary};
use tracing::debug;

use super::{format_timestamp, truncate, Session};
use crate::config::CliConfig;

#[derive(Subcommand)]
pub enum RoomsCommand {
    #[command(about = "List your conversations, most recent first")]
    Rooms {
        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Create (or repair) the room shared with another user")]
    Open {
        #[arg(help = "Other user id")]
        other: String,

        #[arg(short, long, help = "Context id; defaults to the general room")]
        context: Option<String>,
    },

    #[command(about = "Show the messages of a room")]
    Messages {
        #[arg(help = "Room id")]
        room_id: String,

        #[arg(short, long, help = "Only show the last N messages")]
        limit: Option<usize>,

        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Follow a room (or your room list) live until Ctrl-C")]
    Watch {
        #[arg(help = "Room id; omit to watch your room list")]
        room_id: Option<String>,
    },

    #[command(about = "Find the room to continue a conversation with a user")]
    Resume {
        #[arg(help = "Other user id")]
        other: String,
    },

    #[command(about = "Delete a room, its messages and every participant's inbox entry")]
    DeleteRoom {
        #[arg(help = "Room id")]
        room_id: String,

        #[arg(short, long, help = "Delete without confirmation")]
        force: bool,
    },

    #[command(about = "Delete every room a user takes part in")]
    Purge {
        #[arg(short, long, help = "User id to purge; defaults to the acting user")]
        user: Option<String>,

        #[arg(short, long, help = "Delete without confirmation")]
        force: bool,
    },
}

pub async fn handle_rooms_command(
    action: RoomsCommand,
    identity: &Identity,
    config: &CliConfig,
) -> Result<()> {
    let session = Session::open(config).await?;
    let result = run_rooms_command(action, identity, &session).await;
    session.close().await;
    result
}

async fn run_rooms_command(
    action: RoomsCommand,
    identity: &Identity,
    session: &Session,
) -> Result<()> {
    let chat = &session.chat;

    match action {
        RoomsCommand::Rooms { format } => {
            if !identity.is_authenticated() {
                bail!("Listing rooms requires an acting user (--as <uid>)");
            }
            let rooms = chat.rooms(identity).await?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&rooms)?);
                return Ok(());
            }
            print_rooms(&identity.id, &rooms);
            Ok(())
        }

        RoomsCommand::Open { other, context } => {
            let room_id = chat.open_room(identity, &other, context.as_deref()).await?;
            println!("{} Room {} is ready", "✓".green().bold(), room_id.cyan());
            Ok(())
        }

        RoomsCommand::Messages {
            room_id,
            limit,
            format,
        } => {
            let mut messages = chat.messages(&room_id).await?;
            if let Some(limit) = limit {
                let skip = messages.len().saturating_sub(limit);
                messages = messages.split_off(skip);
            }

            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&messages)?);
                return Ok(());
            }
            print_messages(&room_id, &messages);
            Ok(())
        }

        RoomsCommand::Watch { room_id } => watch(session, identity, room_id).await,

        RoomsCommand::Resume { other } => {
            let room_id = chat.resume_conversation(identity, &other).await?;
            println!("{} Continue in room {}", "→".blue(), room_id.cyan());
            Ok(())
        }

        RoomsCommand::DeleteRoom { room_id, force } => {
            if !force {
                println!("{} About to delete room '{}'", "!".yellow(), room_id);
                println!("  This removes all of its messages and every participant's inbox entry.");
                println!("  Re-run with --force to confirm.");
                return Ok(());
            }

            println!("  {} Deleting room '{}'...", "→".blue(), room_id);
            chat.delete_room(identity, &room_id).await?;
            println!("  {} Room '{}' deleted", "✓".green(), room_id);
            Ok(())
        }

        RoomsCommand::Purge { user, force } => {
            let user_id = match user {
                Some(user) => user,
                None if identity.is_authenticated() => identity.id.clone(),
                None => bail!("Specify --user <uid> or an acting user with --as <uid>"),
            };

            if !force {
                println!(
                    "{} About to delete every room of user '{}'",
                    "!".yellow(),
                    user_id
                );
                println!("  Re-run with --force to confirm.");
                return Ok(());
            }

            let report = chat.delete_all_for_user(&user_id).await?;
            println!(
                "{} Deleted {} room(s) of '{}'",
                "✓".green().bold(),
                report.deleted.len(),
                user_id
            );
            for (room_id, reason) in &report.failed {
                println!("  {} {}: {}", "✗".red(), room_id, reason);
            }
            if !report.is_complete() {
                bail!("{} room(s) could not be deleted", report.failed.len());
            }
            Ok(())
        }
    }
}

async fn watch(session: &Session, identity: &Identity, room_id: Option<String>) -> Result<()> {
    let chat = &session.chat;

    let subscription = match room_id {
        Some(room_id) => {
            println!(
                "{} {} {}",
                "Watching room".cyan().bold(),
                room_id.cyan(),
                "(Ctrl-C to stop)".dimmed()
            );
            let mut printed = 0usize;
            chat.subscribe_messages(&room_id, move |messages| {
                if messages.len() < printed {
                    println!("{}", "Messages were removed; showing the room again.".yellow());
                    printed = 0;
                }
                for message in &messages[printed..] {
                    print_message_line(message);
                }
                printed = messages.len();
            })
            .await?
        }
        None => {
            if !identity.is_authenticated() {
                bail!("Watching rooms requires an acting user (--as <uid>)");
            }
            println!(
                "{} {}",
                "Watching your rooms".cyan().bold(),
                "(Ctrl-C to stop)".dimmed()
            );
            let user_id = identity.id.clone();
            chat.subscribe_rooms(identity, move |rooms| {
                let unread: i64 = rooms.iter().map(|r| r.unread_count).sum();
                println!(
                    "{} {} room(s), {} unread",
                    "─".repeat(4).dimmed(),
                    rooms.len(),
                    unread
                );
                for room in rooms.iter().filter(|r| r.unread_count > 0) {
                    println!(
                        "  {} {} ({}): {}",
                        "●".yellow(),
                        room.room_id,
                        room.unread_count,
                        truncate(&room.last_message, 60)
                    );
                }
                debug!(user_id = %user_id, rooms = rooms.len(), "Room list refreshed");
            })
            .await?
        }
    };

    tokio::signal::ctrl_c().await?;
    subscription.unsubscribe();
    println!();
    println!("{}", "Stopped watching.".dimmed());
    Ok(())
}

fn print_rooms(user_id: &str, rooms: &[RoomSummary]) {
    if rooms.is_empty() {
        println!("{}", "No conversations yet.".yellow());
        return;
    }

    println!("{} {}", "Conversations of".cyan().bold(), user_id.cyan().bold());
    println!("{}", "═".repeat(60).dimmed());
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Room").fg(Color::Cyan),
            Cell::new("With").fg(Color::Cyan),
            Cell::new("Context").fg(Color::Cyan),
            Cell::new("Last Message").fg(Color::Cyan),
            Cell::new("When").fg(Color::Cyan),
            Cell::new("Unread").fg(Color::Cyan),
        ]);

    for room in rooms {
        let unread = if room.unread_count > 0 {
            Cell::new(room.unread_count).fg(Color::Yellow)
        } else {
            Cell::new("-").fg(Color::DarkGrey)
        };

        table.add_row(vec![
            Cell::new(&room.room_id),
            Cell::new(&room.other_user_id),
            Cell::new(&room.context_id),
            Cell::new(truncate(&room.last_message, 40)),
            Cell::new(format_timestamp(room.last_message_timestamp)),
            unread,
        ]);
    }

    println!("{}", table);

    let unread: i64 = rooms.iter().map(|r| r.unread_count).sum();
    println!();
    println!(
        "  {} room(s), {} unread message(s)",
        rooms.len().to_string().bold(),
        unread.to_string().bold()
    );
}

fn print_messages(room_id: &str, messages: &[ChatMessage]) {
    if messages.is_empty() {
        println!("{}", "No messages in this room.".yellow());
        return;
    }

    println!("{} {}", "Room".cyan().bold(), room_id.cyan().bold());
    println!("{}", "═".repeat(60).dimmed());

    for message in messages {
        print_message_line(message);
    }
}

fn print_message_line(message: &ChatMessage) {
    let marker = if message.read {
        " ".normal()
    } else {
        "●".yellow()
    };

    println!(
        "{} {} {}",
        marker,
        format_timestamp(message.timestamp).dimmed(),
        message.sender_name.bold()
    );

    match message.purchase_status() {
        Some(status) => {
            println!(
                "    {} [{}] {}",
                "Purchase request".magenta(),
                status,
                message.id.dimmed()
            );
            for line in message.text.lines() {
                println!("    {}", line);
            }
        }
        None => println!("    {}", message.text),
    }
}
