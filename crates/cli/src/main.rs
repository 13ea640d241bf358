//! Operator command line for the requisition tracker.
//!
//! Works directly on the document store, as the local operator with administrator rights, for
//! setup and recovery tasks that should not need the HTTP API (first admin, roles, catalog
//! seeding, quick status checks).

use clap::{Parser, Subcommand};
use reqtrack_core::constants::DEFAULT_DATA_DIR;
use reqtrack_core::{
    Actor, EmailAddress, GroupInput, ProcedureInput, RecordId, RequisitionFilter,
    RequisitionStatus, Role, Services, UnitInput,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "reqtrack")]
#[command(about = "Requisition tracker operator CLI")]
struct Cli {
    /// Document store root (defaults to REQTRACK_DATA_DIR, then ./reqtrack_data)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or promote the first administrator
    BootstrapAdmin {
        /// Display name used when a new profile is created
        name: String,
        email: String,
    },
    /// List user profiles
    Users,
    /// Change a user's role (pending, viewer, registrar, scheduler, admin)
    SetRole { email: String, role: String },
    /// Create a health unit
    CreateUnit {
        name: String,
        /// 7-digit registry code
        #[arg(long)]
        cnes: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Create a procedure group
    CreateGroup {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Create a procedure in a group
    CreateProcedure {
        group_id: String,
        name: String,
        #[arg(long)]
        code: Option<String>,
    },
    /// List units, procedure groups and procedures
    Catalog,
    /// List requisitions, newest first
    Requisitions {
        /// Only this status
        #[arg(long)]
        status: Option<String>,
    },
    /// Count requisitions per status
    Summary,
}

fn operator() -> Actor {
    Actor {
        user_id: RecordId::new(),
        role: Role::Admin,
        unit_id: None,
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'reqtrack --help' for commands");
        return Ok(());
    };

    let data_dir = cli.data_dir.unwrap_or_else(|| {
        std::env::var("REQTRACK_DATA_DIR")
            .unwrap_or_else(|_| DEFAULT_DATA_DIR.into())
            .into()
    });
    let store = Arc::new(reqtrack_core::DocumentStore::open(&data_dir)?);
    let services = Services::new(store);
    let actor = operator();

    match command {
        Commands::BootstrapAdmin { name, email } => {
            match services.users.ensure_admin(&name, &email)? {
                Some(profile) => println!(
                    "{} <{}> is now admin (id {})",
                    profile.name, profile.email, profile.id
                ),
                None => println!("An administrator already exists; nothing changed."),
            }
        }
        Commands::Users => {
            let users = services.users.list(&actor)?;
            if users.is_empty() {
                println!("No users found.");
            }
            for user in users {
                println!(
                    "{}  {:<10} {} <{}>",
                    user.id,
                    user.role.as_str(),
                    user.name,
                    user.email
                );
            }
        }
        Commands::SetRole { email, role } => {
            let email = EmailAddress::parse(email)?;
            let role: Role = role.parse()?;
            let profile = services
                .users
                .find_by_email(&email)
                .ok_or_else(|| anyhow::anyhow!("no user registered as {}", email))?;
            let profile = services.users.set_role(&actor, &profile.id, role)?;
            println!("{} is now {}", profile.email, profile.role);
        }
        Commands::CreateUnit { name, cnes, phone } => {
            let unit = services.units.create(
                &actor,
                &UnitInput {
                    name,
                    cnes,
                    phone,
                    ..UnitInput::default()
                },
            )?;
            println!("Created unit {} ({})", unit.name, unit.id);
        }
        Commands::CreateGroup { name, description } => {
            let group = services
                .procedures
                .create_group(&actor, &GroupInput { name, description })?;
            println!("Created procedure group {} ({})", group.name, group.id);
        }
        Commands::CreateProcedure {
            group_id,
            name,
            code,
        } => {
            let procedure = services.procedures.create(
                &actor,
                &ProcedureInput {
                    name,
                    group_id,
                    code,
                    ..ProcedureInput::default()
                },
            )?;
            println!("Created procedure {} ({})", procedure.name, procedure.id);
        }
        Commands::Catalog => {
            for unit in services.units.list(&actor, true)? {
                let state = if unit.active { "" } else { " (inactive)" };
                println!("unit       {}  {}{}", unit.id, unit.name, state);
            }
            for group in services.procedures.list_groups(&actor)? {
                println!("group      {}  {}", group.id, group.name);
                for procedure in services.procedures.list(&actor, Some(&group.id), true)? {
                    println!("  procedure {}  {}", procedure.id, procedure.name);
                }
            }
        }
        Commands::Requisitions { status } => {
            let filter = RequisitionFilter {
                status: status
                    .map(|s| s.parse::<RequisitionStatus>())
                    .transpose()?,
                ..RequisitionFilter::default()
            };
            let requisitions = services.requisitions.list(&actor, &filter)?;
            if requisitions.is_empty() {
                println!("No requisitions found.");
            }
            for r in requisitions {
                println!(
                    "{}  {:<11} {:<8} {}  {}",
                    r.protocol,
                    r.status.as_str(),
                    r.priority.as_str(),
                    r.created_at.format("%Y-%m-%d"),
                    r.patient.name
                );
            }
        }
        Commands::Summary => {
            let s = services.requisitions.summary(&actor)?;
            println!("pending      {}", s.pending);
            println!("scheduled    {}", s.scheduled);
            println!("completed    {}", s.completed);
            println!("canceled     {}", s.canceled);
            println!("resolicited  {}", s.resolicited);
            println!("total        {}", s.total);
        }
    }

    Ok(())
}
