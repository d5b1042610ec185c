use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    events::{ClientEvent, NoticeLevel, Route},
    interaction::InteractionState,
    pagination::PageRequest,
    two_factor::{TwoFactorState, TwoFactorStep},
    AppContext, Confirm, CurrentUser, FixedAnswer, GatewayConfig, HttpGateway,
    ImageFile, InteractionController, Lifetime, SaveOutcome, Session,
};
use shared::{
    domain::{EnvironmentId, InteractionKind, UserId},
    protocol::{NewRuleset, Settings},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
#[command(name = "envshare", about = "Command-line client for the envshare backend")]
struct Args {
    /// Backend base URL, e.g. http://127.0.0.1:3000/api/
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[arg(long, global = true)]
    token: Option<String>,
    /// Id of the signed-in user.
    #[arg(long, global = true)]
    user_id: Option<i64>,
    /// Answer yes to every confirmation prompt.
    #[arg(long, short = 'y', global = true)]
    yes: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Profile {
        user_id: i64,
    },
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Like an environment (or remove the like with --undo).
    Like {
        environment_id: i64,
        #[arg(long)]
        undo: bool,
    },
    /// Save an environment (or unsave it with --undo).
    Save {
        environment_id: i64,
        #[arg(long)]
        undo: bool,
    },
    Avatar {
        #[command(subcommand)]
        action: AvatarAction,
    },
    Logo {
        #[command(subcommand)]
        action: LogoAction,
    },
    Environment {
        #[command(subcommand)]
        action: EnvironmentAction,
    },
    Rulesets {
        #[command(subcommand)]
        action: RulesetAction,
    },
    TwoFactor {
        #[command(subcommand)]
        action: TwoFactorAction,
    },
    Tags {
        #[command(subcommand)]
        action: TagAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    Update {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum AvatarAction {
    Upload { path: PathBuf },
}

#[derive(Subcommand, Debug)]
enum LogoAction {
    Upload { environment_id: i64, path: PathBuf },
}

#[derive(Subcommand, Debug)]
enum EnvironmentAction {
    Delete { environment_id: i64 },
}

#[derive(Subcommand, Debug)]
enum RulesetAction {
    List {
        user_id: i64,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = client_core::pagination::DEFAULT_PER_PAGE)]
        per_page: u32,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TwoFactorAction {
    Status,
    Enable {
        #[arg(long)]
        code: String,
    },
    Disable,
}

#[derive(Subcommand, Debug)]
enum TagAction {
    Search { prefix: String },
}

/// Asks on the terminal; anything but "y"/"yes" declines.
struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        // Prompts are answered from inside async commands.
        tokio::task::block_in_place(|| ask(prompt, &mut io::stdin().lock(), &mut io::stdout()))
    }
}

fn ask(prompt: &str, input: &mut impl BufRead, output: &mut impl Write) -> bool {
    if write!(output, "{prompt} [y/N] ").and_then(|()| output.flush()).is_err() {
        return false;
    }
    let mut answer = String::new();
    if input.read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = config::load_settings();
    if let Some(url) = args.api_url.clone() {
        settings.api_url = url;
    }
    if let Some(token) = args.token.clone() {
        settings.api_token = Some(token);
    }
    if let Some(user_id) = args.user_id {
        settings.user_id = Some(user_id);
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let gateway_config = GatewayConfig::new(&settings.api_url)
        .with_context(|| format!("invalid api url '{}'", settings.api_url))?
        .with_token(settings.api_token.clone())
        .with_timeout(settings.request_timeout());
    let gateway = HttpGateway::new(gateway_config).context("failed to build http client")?;
    info!(api_url = %gateway.base_url(), "envshare: gateway ready");

    let session = match settings.user_id {
        Some(id) => Session::signed_in(CurrentUser {
            id: UserId(id),
            username: String::new(),
        }),
        None => Session::anonymous(),
    };
    let confirm: Arc<dyn Confirm> = if args.yes {
        Arc::new(FixedAnswer(true))
    } else {
        Arc::new(StdinConfirm)
    };
    let app = AppContext::new(Arc::new(gateway), session, confirm);

    let mut events = app.events().subscribe();
    let command = run(args.command, &app);
    tokio::pin!(command);
    let result = loop {
        tokio::select! {
            result = &mut command => break result,
            Ok(event) = events.recv() => print_event(&event),
        }
    };
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
    result
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::Notice(notice) => {
            let tag = match notice.level {
                NoticeLevel::Loading => "..",
                NoticeLevel::Success => "ok",
                NoticeLevel::Error => "!!",
            };
            eprintln!("[{tag}] {}", notice.message);
        }
        ClientEvent::NoticeDismissed(_) => {}
        ClientEvent::Navigate(Route::Home) => eprintln!("-> returning to start page"),
        ClientEvent::Navigate(route) => eprintln!("-> {route:?}"),
    }
}

fn signed_in_user(app: &AppContext) -> Result<UserId> {
    app.session()
        .user_id()
        .context("this command needs a user id (--user-id or ENVSHARE_USER_ID)")
}

fn read_image(path: &Path) -> Result<ImageFile> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();
    let content_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    Ok(ImageFile {
        file_name,
        content_type,
        bytes,
    })
}

async fn run(command: Command, app: &AppContext) -> Result<()> {
    match command {
        Command::Profile { user_id } => {
            let view = app
                .profile()
                .load(UserId(user_id))
                .await
                .context("failed to load profile")?;
            println!("#{} {}", view.profile.id, view.profile.username);
            println!("{}", view.description());
            if view.is_own {
                println!("(this is you)");
            }
        }
        Command::Settings { action } => run_settings(action, app).await?,
        Command::Like {
            environment_id,
            undo,
        } => toggle(app, EnvironmentId(environment_id), InteractionKind::Like, undo).await?,
        Command::Save {
            environment_id,
            undo,
        } => toggle(app, EnvironmentId(environment_id), InteractionKind::Save, undo).await?,
        Command::Avatar {
            action: AvatarAction::Upload { path },
        } => {
            let user_id = signed_in_user(app)?;
            let file = read_image(&path)?;
            app.avatar(user_id)
                .upload(file)
                .await
                .context("avatar upload failed")?;
        }
        Command::Logo {
            action:
                LogoAction::Upload {
                    environment_id,
                    path,
                },
        } => {
            let file = read_image(&path)?;
            app.logo(EnvironmentId(environment_id))
                .upload(file)
                .await
                .context("logo upload failed")?;
        }
        Command::Environment {
            action: EnvironmentAction::Delete { environment_id },
        } => delete_environment(app, EnvironmentId(environment_id)).await?,
        Command::Rulesets { action } => run_rulesets(action, app).await?,
        Command::TwoFactor { action } => run_two_factor(action, app).await?,
        Command::Tags {
            action: TagAction::Search { prefix },
        } => {
            let tags = app
                .tag_search()
                .search(&prefix)
                .await
                .context("tag search failed")?;
            for tag in tags {
                println!("{}\t{}", tag.id, tag.name);
            }
        }
    }
    Ok(())
}

async fn run_settings(action: SettingsAction, app: &AppContext) -> Result<()> {
    let controller = app.settings();
    let current = controller.load().await.context("failed to load settings")?;
    match action {
        SettingsAction::Show => {
            println!("username: {}", current.username);
            println!("description: {}", current.description);
        }
        SettingsAction::Update {
            username,
            description,
        } => {
            let draft = Settings {
                username: username.unwrap_or(current.username),
                description: description.unwrap_or(current.description),
            };
            match controller.save(&draft).await.context("failed to save settings")? {
                SaveOutcome::Unchanged => println!("nothing to change"),
                SaveOutcome::Saved(saved) => {
                    println!("username: {}", saved.username);
                    println!("description: {}", saved.description);
                }
            }
        }
    }
    Ok(())
}

/// The CLI has no cached entity, so the starting state is the opposite of
/// the requested one and the count is unknown.
async fn toggle(
    app: &AppContext,
    environment_id: EnvironmentId,
    kind: InteractionKind,
    undo: bool,
) -> Result<()> {
    let controller = InteractionController::new(
        environment_id,
        kind,
        InteractionState::new(undo, 0),
        Arc::clone(app.gateway()),
        app.events().clone(),
        Lifetime::new(),
    );
    controller.toggle();
    let state = controller.settled().await;
    if state.active == undo {
        bail!("{kind} on environment {environment_id} was not applied");
    }
    println!("{kind}: {}", if state.active { "on" } else { "off" });
    Ok(())
}

async fn delete_environment(app: &AppContext, environment_id: EnvironmentId) -> Result<()> {
    let deleted = app
        .delete_environment(environment_id)
        .await
        .context("failed to delete environment")?;
    if !deleted {
        println!("cancelled");
    }
    Ok(())
}

async fn run_rulesets(action: RulesetAction, app: &AppContext) -> Result<()> {
    match action {
        RulesetAction::List {
            user_id,
            page,
            per_page,
        } => {
            let state = app
                .rulesets(UserId(user_id), PageRequest::new(page, per_page))
                .fetch()
                .await
                .context("failed to list rulesets")?;
            for ruleset in &state.items {
                println!("{}\t{}", ruleset.id, ruleset.name);
            }
            println!(
                "page {} of {} ({} rulesets)",
                state.request.page(),
                state.total_pages.max(1),
                state.total
            );
        }
        RulesetAction::Create { name, description } => {
            let user_id = signed_in_user(app)?;
            let created = app
                .rulesets(user_id, PageRequest::default())
                .create(NewRuleset { name, description })
                .await
                .context("failed to create ruleset")?;
            println!("{}\t{}", created.id, created.name);
        }
    }
    Ok(())
}

async fn run_two_factor(action: TwoFactorAction, app: &AppContext) -> Result<()> {
    let controller = app.two_factor();
    let state = controller
        .mount()
        .await
        .context("failed to load two-factor status")?;
    match action {
        TwoFactorAction::Status => match state {
            TwoFactorState::Enabled => println!("2FA is enabled"),
            TwoFactorState::Disabled {
                provisioning: Some(provisioning),
            } => {
                println!("2FA is disabled");
                println!("secret: {}", provisioning.secret);
                println!("uri: {}", provisioning.otpauth_uri);
            }
            _ => println!("2FA is disabled"),
        },
        TwoFactorAction::Enable { code } => {
            if state == TwoFactorState::Enabled {
                println!("2FA is already enabled");
                return Ok(());
            }
            controller.enter_code(&code);
            match controller.submit().await.context("failed to enable 2FA")? {
                TwoFactorStep::Moved(_) => println!("2FA enabled"),
                TwoFactorStep::Ignored => bail!("the code must have 6 digits"),
            }
        }
        TwoFactorAction::Disable => {
            match controller.disable().await.context("failed to disable 2FA")? {
                TwoFactorStep::Moved(_) => println!("2FA disabled"),
                TwoFactorStep::Ignored => println!("2FA left unchanged"),
            }
        }
    }
    Ok(())
}
