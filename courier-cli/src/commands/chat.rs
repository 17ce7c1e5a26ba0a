use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use courier_core::{ChatMessage, Identity, PaymentMethod, PurchaseRequest, PurchaseStatus};
use serde::Serialize;

use super::Session;
use crate::config::CliConfig;

#[derive(Subcommand)]
pub enum ChatCommand {
    #[command(about = "Send a text message to another user")]
    Send {
        #[arg(help = "Recipient user id")]
        recipient: String,

        #[arg(help = "Message text")]
        text: String,

        #[arg(short, long, help = "Context id (e.g. a product id); defaults to the general room")]
        context: Option<String>,

        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Send a purchase request for a product")]
    Purchase {
        #[arg(help = "Recipient user id (the seller)")]
        recipient: String,

        #[arg(short, long, help = "Product id the request is about")]
        context: String,

        #[arg(short, long, help = "Product label shown in the request")]
        label: String,

        #[arg(short, long, help = "Agreed price")]
        price: f64,

        #[arg(short, long, default_value = "stripe", help = "Payment method (stripe, bitcoin)")]
        method: PaymentMethod,

        #[arg(long, help = "Route the transaction through the escrow agent")]
        escrow: bool,

        #[arg(short, long, help = "Bitcoin wallet address (bitcoin only)")]
        wallet: Option<String>,

        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Move a purchase request to agreed or completed")]
    Status {
        #[arg(help = "Room id")]
        room_id: String,

        #[arg(help = "Message id of the purchase request")]
        message_id: String,

        #[arg(help = "New status (agreed, completed)")]
        status: PurchaseStatus,
    },

    #[command(about = "Mark messages from a sender as read")]
    Read {
        #[arg(help = "Room id")]
        room_id: String,

        #[arg(help = "Sender whose messages should be marked read")]
        sender_id: String,
    },

    #[command(about = "Recompute your unread counter for a room from its messages")]
    Reconcile {
        #[arg(help = "Room id")]
        room_id: String,
    },

    #[command(about = "Send a message to the escrow agent")]
    Escrow {
        #[arg(help = "Message text")]
        text: String,

        #[arg(short, long, help = "Context id; defaults to the escrow context")]
        context: Option<String>,

        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SentMessage<'a> {
    room_id: &'a str,
    message: &'a ChatMessage,
}

pub async fn handle_chat_command(
    action: ChatCommand,
    identity: &Identity,
    config: &CliConfig,
) -> Result<()> {
    let session = Session::open(config).await?;
    let result = run_chat_command(action, identity, &session).await;
    session.close().await;
    result
}

async fn run_chat_command(action: ChatCommand, identity: &Identity, session: &Session) -> Result<()> {
    let chat = &session.chat;

    match action {
        ChatCommand::Send {
            recipient,
            text,
            context,
            format,
        } => {
            let message = chat
                .send(identity, &recipient, &text, context.as_deref())
                .await?;
            let room_id = chat.room_id_for(&identity.id, &recipient, context.as_deref())?;
            print_sent(&room_id, &message, &format)
        }

        ChatCommand::Purchase {
            recipient,
            context,
            label,
            price,
            method,
            escrow,
            wallet,
            format,
        } => {
            let mut request =
                PurchaseRequest::new(label, price, context.clone(), method).with_escrow(escrow);
            if let Some(wallet) = wallet {
                request = request.with_wallet_address(wallet);
            }

            let message = chat
                .send_purchase_request(identity, &recipient, &request)
                .await?;
            let room_id = chat.room_id_for(&identity.id, &recipient, Some(&context))?;
            print_sent(&room_id, &message, &format)
        }

        ChatCommand::Status {
            room_id,
            message_id,
            status,
        } => {
            let message = chat
                .update_status(identity, &room_id, &message_id, status)
                .await?;
            println!(
                "{} Purchase request {} is now {}",
                "✓".green().bold(),
                message.id.cyan(),
                status.to_string().green()
            );
            if status == PurchaseStatus::Agreed {
                println!(
                    "  {} Notified {} that the request was agreed",
                    "→".blue(),
                    message.sender_id
                );
            }
            Ok(())
        }

        ChatCommand::Read { room_id, sender_id } => {
            let marked = chat.mark_read(identity, &room_id, &sender_id).await?;
            if marked == 0 {
                println!("{}", "Nothing to mark as read.".yellow());
            } else {
                println!(
                    "{} Marked {} message(s) from {} as read",
                    "✓".green().bold(),
                    marked,
                    sender_id
                );
            }
            Ok(())
        }

        ChatCommand::Reconcile { room_id } => {
            let unread = chat.reconcile_unread(identity, &room_id).await?;
            println!(
                "{} Unread count for {} is {}",
                "✓".green().bold(),
                room_id.cyan(),
                unread
            );
            Ok(())
        }

        ChatCommand::Escrow {
            text,
            context,
            format,
        } => {
            let (room_id, message) = chat
                .send_to_escrow_agent(identity, &text, context.as_deref())
                .await?;
            if format != "json" && message.recipient_id == chat.settings().escrow_placeholder_id {
                println!(
                    "{} No escrow agent is registered; the message is queued for one.",
                    "!".yellow()
                );
            }
            print_sent(&room_id, &message, &format)
        }
    }
}

fn print_sent(room_id: &str, message: &ChatMessage, format: &str) -> Result<()> {
    if format == "json" {
        let output = SentMessage { room_id, message };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{} Sent to {} in room {}",
        "✓".green().bold(),
        message.recipient_id.bold(),
        room_id.cyan()
    );
    println!("  {:<12} {}", "Message id:".dimmed(), message.id);
    println!("  {:<12} {}", "Context:".dimmed(), message.context_id);
    if let Some(status) = message.status {
        println!("  {:<12} {}", "Status:".dimmed(), status);
    }
    Ok(())
}
