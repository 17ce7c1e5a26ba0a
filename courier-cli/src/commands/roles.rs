use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use courier_core::{Role, UserProfile};

use super::{format_timestamp, Session};
use crate::config::CliConfig;

#[derive(Subcommand)]
pub enum RolesCommand {
    #[command(about = "Grant a role to an email address")]
    Grant {
        #[arg(help = "Email address")]
        email: String,

        #[arg(help = "Role (escrow_agent, admin, user)")]
        role: Role,
    },

    #[command(about = "Remove the role of an email address")]
    Revoke {
        #[arg(help = "Email address")]
        email: String,
    },

    #[command(about = "Show the role of an email address")]
    Show {
        #[arg(help = "Email address")]
        email: String,
    },

    #[command(about = "Show which account receives escrow messages")]
    Agent,

    #[command(about = "Add an admin")]
    AdminAdd {
        #[arg(help = "Email address")]
        email: String,
    },

    #[command(about = "Remove an admin")]
    AdminRemove {
        #[arg(help = "Email address")]
        email: String,
    },

    #[command(about = "List admins")]
    Admins {
        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Show a user profile, or store one when --email is given")]
    Profile {
        #[arg(help = "User id")]
        uid: String,

        #[arg(short, long, help = "Email address to store")]
        email: Option<String>,

        #[arg(short, long = "display-name", help = "Display name to store")]
        display_name: Option<String>,
    },
}

pub async fn handle_roles_command(action: Option<RolesCommand>, config: &CliConfig) -> Result<()> {
    let session = Session::open(config).await?;
    let result = run_roles_command(action.unwrap_or(RolesCommand::Agent), &session).await;
    session.close().await;
    result
}

async fn run_roles_command(action: RolesCommand, session: &Session) -> Result<()> {
    let roles = session.chat.roles();

    match action {
        RolesCommand::Grant { email, role } => {
            roles.grant_role(&email, role).await?;
            println!(
                "{} Granted {} to {}",
                "✓".green().bold(),
                role.to_string().cyan(),
                email
            );
        }

        RolesCommand::Revoke { email } => {
            roles.revoke_role(&email).await?;
            println!("{} Revoked role of {}", "✓".green().bold(), email);
        }

        RolesCommand::Show { email } => match roles.role_of(&email).await? {
            Some(role) => println!("{} {}", email.bold(), role.to_string().cyan()),
            None => println!("{} has no role", email.bold()),
        },

        RolesCommand::Agent => match session.chat.resolve_escrow_agent().await {
            Some(uid) => {
                println!("{} {}", "Escrow agent:".bold(), uid.green());
                if let Some(profile) = roles.profile(&uid).await? {
                    println!("  {:<8} {}", "Email:".dimmed(), profile.email);
                    if let Some(name) = profile.display_name {
                        println!("  {:<8} {}", "Name:".dimmed(), name);
                    }
                }
            }
            None => {
                println!("{}", "No escrow agent is registered.".yellow());
                println!(
                    "  Escrow messages go to '{}' until one is.",
                    session.chat.settings().escrow_placeholder_id
                );
                println!("  Grant one with: courier roles grant <email> escrow_agent");
            }
        },

        RolesCommand::AdminAdd { email } => {
            roles.add_admin(&email).await?;
            println!("{} {} is now an admin", "✓".green().bold(), email);
        }

        RolesCommand::AdminRemove { email } => {
            roles.remove_admin(&email).await?;
            println!("{} {} is no longer an admin", "✓".green().bold(), email);
        }

        RolesCommand::Admins { format } => {
            let admins = roles.list_admins().await?;

            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&admins)?);
                return Ok(());
            }

            if admins.is_empty() {
                println!("{}", "No admins registered.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    Cell::new("Email").fg(Color::Cyan),
                    Cell::new("Added").fg(Color::Cyan),
                ]);
            for admin in &admins {
                table.add_row(vec![
                    Cell::new(&admin.email),
                    Cell::new(format_timestamp(admin.created_at)),
                ]);
            }
            println!("{}", table);
        }

        RolesCommand::Profile {
            uid,
            email,
            display_name,
        } => {
            if let Some(email) = email {
                roles
                    .upsert_profile(&UserProfile {
                        uid: uid.clone(),
                        email,
                        display_name,
                    })
                    .await?;
                println!("{} Stored profile for {}", "✓".green().bold(), uid);
                return Ok(());
            }

            match roles.profile(&uid).await? {
                Some(profile) => {
                    println!("{} {}", "Profile".cyan().bold(), profile.uid.cyan().bold());
                    println!("  {:<8} {}", "Email:".dimmed(), profile.email);
                    println!(
                        "  {:<8} {}",
                        "Name:".dimmed(),
                        profile.display_name.as_deref().unwrap_or("-")
                    );
                    let role = if profile.email.is_empty() {
                        None
                    } else {
                        roles.role_of(&profile.email).await?
                    };
                    println!(
                        "  {:<8} {}",
                        "Role:".dimmed(),
                        role.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string())
                    );
                }
                None => println!("{}", format!("No profile for '{}'", uid).yellow()),
            }
        }
    }

    Ok(())
}
