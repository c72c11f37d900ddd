use olympiad_client::{api, config, evaluation, homework, models, notification, session};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use chrono::{Local, Utc};
use std::fs;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use api::ApiClient;
use config::ClientConfig;
use models::{NewHomeworkAttempt, SignupRequest, UploadFile, UserUpdate};
use session::{LoggingNavigator, Session};

#[derive(Parser)]
#[command(name = "olympiad_client")]
#[command(about = "Student dashboard client for the informatics olympiad backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a config template
    CreateConfig,
    /// Sign in and store the session
    Login {
        identifier: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account and store the session
    Signup {
        username: String,
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(long)]
        display_name: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami {
        /// Re-read the profile from the backend
        #[arg(long)]
        refresh: bool,
    },
    /// Change the display name
    Rename { display_name: String },
    /// Upload a new profile image
    Avatar { file: PathBuf },
    /// List homeworks of a contest cycle
    Homeworks { contest_cycle: i64 },
    /// List your homework attempts
    Attempts,
    /// Submit files for a homework
    Submit {
        homework: i64,
        files: Vec<PathBuf>,
    },
    /// Show active notifications for the given contest cycles
    Notifications { contest_cycles: Vec<i64> },
    /// Show the questions of an evaluation
    Evaluation { id: i64 },
    /// Answer a radio-group evaluation, e.g. `answer 4 1=11 2=22`
    Answer { id: i64, choices: Vec<String> },
}

fn init_tracing(log_dir: &str) -> Result<()> {
    let log_dir = PathBuf::from(log_dir);
    fs::create_dir_all(&log_dir)?;

    let log_file = log_dir.join(format!(
        "olympiad_client_{}.log",
        Local::now().format("%Y%m%d")
    ));

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact();

    let file_layer = fmt::layer()
        .with_writer(std::sync::Arc::new(file))
        .with_target(true)
        .with_ansi(false)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::CreateConfig = cli.command {
        config::create_config_template()?;
        println!("Config template created at config.json");
        return Ok(());
    }

    let config_path = cli
        .config
        .or_else(|| std::env::var(config::CONFIG_PATH_ENV).ok())
        .unwrap_or_else(|| "config.json".to_string());
    let config = ClientConfig::load(&config_path)?;
    init_tracing(&config.logs.path)?;
    info!("Using backend {}", config.backend.url);

    let api = ApiClient::from_config(&config);
    let mut session = Session::new(api, Box::new(LoggingNavigator), config.routes.clone());
    session.restore();

    run(cli.command, &mut session).await
}

fn signed_in_user_id(session: &Session) -> Result<i64> {
    session
        .user()
        .map(|u| u.id)
        .context("Not signed in; run `login` first")
}

async fn run(command: Commands, session: &mut Session) -> Result<()> {
    match command {
        Commands::CreateConfig => Ok(()),
        Commands::Login {
            identifier,
            password,
        } => {
            let user = session.login(&identifier, &password).await?;
            println!("Signed in as {} ({:?})", user.name(), user.role_type);
            Ok(())
        }
        Commands::Signup {
            username,
            email,
            password,
            display_name,
        } => {
            let request = SignupRequest {
                username,
                email,
                password,
                display_name,
            };
            let user = session.signup(&request).await?;
            println!("Account created for {}", user.email);
            Ok(())
        }
        Commands::Logout => {
            session.logout();
            println!("Signed out");
            Ok(())
        }
        Commands::Whoami { refresh } => {
            if refresh {
                session.refresh_user().await?;
            }
            match session.user() {
                Some(user) => {
                    println!("{} <{}>", user.name(), user.email);
                    println!("  id: {}", user.id);
                    println!("  role: {:?}", user.role_type);
                    if let Some(image) = &user.profile_image {
                        println!("  avatar: {}", image.url);
                    }
                }
                None => println!("Not signed in"),
            }
            Ok(())
        }
        Commands::Rename { display_name } => {
            let update = UserUpdate {
                display_name: Some(display_name),
                ..UserUpdate::default()
            };
            let user = session.update_user(&update).await?;
            println!("Display name is now {}", user.name());
            Ok(())
        }
        Commands::Avatar { file } => {
            let upload = UploadFile::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            session.update_avatar(upload).await?;
            println!("Avatar updated");
            Ok(())
        }
        Commands::Homeworks { contest_cycle } => {
            let homeworks = homework::fetch_homeworks(session.api(), contest_cycle).await?;
            for hw in homeworks {
                let deadline = hw
                    .deadline
                    .map(|d| d.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "no deadline".to_string());
                println!("#{} {} [{:?}] {}", hw.id, hw.title, hw.kind, deadline);
            }
            Ok(())
        }
        Commands::Attempts => {
            let user_id = signed_in_user_id(session)?;
            let attempts = homework::fetch_user_homeworks(session.api(), user_id).await?;
            if attempts.is_empty() {
                println!("No attempts yet");
            }
            for attempt in attempts {
                let title = attempt
                    .homework
                    .as_ref()
                    .map(|h| h.title.as_str())
                    .unwrap_or("?");
                let grade = attempt
                    .grade
                    .map(|g| g.to_string())
                    .unwrap_or_else(|| "pending".to_string());
                println!(
                    "#{} {} files={} grade={}",
                    attempt.id,
                    title,
                    attempt.delivered_files.len(),
                    grade
                );
            }
            Ok(())
        }
        Commands::Submit {
            homework: homework_id,
            files,
        } => {
            let user_id = signed_in_user_id(session)?;
            let hw = homework::fetch_homework_by_id(session.api(), homework_id).await?;
            let contest_cycle = hw
                .contest_cycle
                .as_ref()
                .map(|c| c.id)
                .context("Homework is not attached to a contest cycle")?;

            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                let upload = UploadFile::read(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                uploads.push(upload);
            }

            let attempt = NewHomeworkAttempt {
                user: user_id,
                homework: hw.id,
                contest_cycle,
                files: uploads,
            };
            let created = homework::submit_homework_attempt(session.api(), attempt, &hw).await?;
            println!("Submitted attempt #{} for '{}'", created.id, hw.title);
            Ok(())
        }
        Commands::Notifications { contest_cycles } => {
            let notifications =
                notification::fetch_user_notifications(session.api(), &contest_cycles, Utc::now())
                    .await?;
            if notifications.is_empty() {
                println!("No active notifications");
            }
            for n in notifications {
                let pin = if n.pinned { "*" } else { " " };
                println!("{} [{}] {} ({})", pin, n.priority, n.title, n.contest_cycle);
                if !n.content.is_empty() {
                    println!("    {}", n.content);
                }
            }
            Ok(())
        }
        Commands::Evaluation { id } => {
            let eval = evaluation::fetch_evaluation(session.api(), id).await?;
            println!("{}", eval.title);
            for (i, question) in eval.questions.iter().enumerate() {
                println!("{}. {} (question {})", i + 1, question.prompt, question.id);
                for option in &question.options {
                    println!("     [{}] {}", option.id, option.text);
                }
            }
            Ok(())
        }
        Commands::Answer { id, choices } => {
            let user_id = signed_in_user_id(session)?;
            let eval = evaluation::fetch_evaluation(session.api(), id).await?;

            let mut answers = models::EvaluationAnswers::new();
            for choice in &choices {
                let (question_id, option_id) = choice
                    .split_once('=')
                    .context("Choices look like <question>=<option>")?;
                let question_id: i64 = question_id.trim().parse()?;
                let option_id: i64 = option_id.trim().parse()?;
                let question = eval
                    .questions
                    .iter()
                    .find(|q| q.id == question_id)
                    .with_context(|| format!("No question {} in evaluation {}", question_id, id))?;
                answers.select(question, option_id)?;
            }

            let unanswered = answers.unanswered(&eval);
            if !unanswered.is_empty() {
                println!("Warning: {} questions left unanswered", unanswered.len());
            }

            let attempt =
                evaluation::submit_evaluation_attempt(session.api(), user_id, &eval, &answers)
                    .await?;
            for answer in &attempt.answers {
                let verdict = match answer.is_correct {
                    Some(true) => "correct",
                    Some(false) => "wrong",
                    None => "not graded",
                };
                println!("question {}: {}", answer.question, verdict);
            }
            Ok(())
        }
    }
}
