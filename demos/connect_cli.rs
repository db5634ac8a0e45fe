use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use plaid_connect::{
    Client, ConnectGetOptions, ConnectOptions, ConnectOutcome, Credentials, Environment,
    MfaChallenge,
};
use std::error::Error;

#[derive(Debug, Parser)]
#[command(name = "connect-cli", about = "CLI wrapper for the Plaid Connect API")]
struct Cli {
    /// Client id; falls back to PLAID_CLIENT_ID env var
    #[arg(long, env = "PLAID_CLIENT_ID")]
    client_id: String,

    /// Secret; falls back to PLAID_SECRET env var
    #[arg(long, env = "PLAID_SECRET", hide_env_values = true)]
    secret: String,

    #[arg(long, env = "PLAID_ENV", value_enum, default_value = "sandbox")]
    env: Env,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Submit credentials for an institution
    AddUser {
        /// Institution type, e.g. "wells"
        #[arg(long = "type")]
        institution_type: String,
        #[command(flatten)]
        credentials: CredentialArgs,
        #[arg(long)]
        webhook: Option<String>,
        /// Only authenticate, do not pull transactions
        #[arg(long)]
        login_only: bool,
        /// Ask for the list of MFA delivery methods
        #[arg(long)]
        list: bool,
    },
    /// Pick the MFA delivery method, e.g. --key mask --value xxx-xxx-5309
    SendMethod {
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
    },
    /// Answer an MFA challenge
    Step {
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        answer: String,
    },
    /// Fetch accounts and transactions
    Get {
        #[arg(long)]
        access_token: String,
        #[arg(long)]
        pending: bool,
        #[arg(long)]
        account: Option<String>,
        /// Earliest date YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        gte: Option<NaiveDate>,
        /// Latest date YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        lte: Option<NaiveDate>,
    },
    /// Update stored credentials
    Update {
        #[arg(long)]
        access_token: String,
        #[command(flatten)]
        credentials: CredentialArgs,
    },
    /// Answer an MFA challenge raised by an update
    UpdateStep {
        #[arg(long)]
        access_token: String,
        #[command(flatten)]
        credentials: CredentialArgs,
        #[arg(long)]
        mfa: String,
    },
    /// Delete a linked user
    Delete {
        #[arg(long)]
        access_token: String,
    },
}

#[derive(Debug, Args)]
struct CredentialArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    pin: Option<String>,
}

impl From<CredentialArgs> for Credentials {
    fn from(value: CredentialArgs) -> Self {
        Credentials {
            username: value.username,
            password: value.password,
            pin: value.pin,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Env {
    Sandbox,
    Production,
}

impl From<Env> for Environment {
    fn from(value: Env) -> Self {
        match value {
            Env::Sandbox => Environment::Sandbox,
            Env::Production => Environment::Production,
        }
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let client = Client::new(cli.client_id, cli.secret, cli.env.into())?;

    let outcome = match cli.command {
        Commands::AddUser {
            institution_type,
            credentials,
            webhook,
            login_only,
            list,
        } => {
            let options = ConnectOptions {
                webhook,
                login_only,
                list,
                ..Default::default()
            };
            client
                .connect_add_user(&institution_type, &credentials.into(), Some(&options))
                .await?
        }
        Commands::SendMethod {
            access_token,
            key,
            value,
        } => {
            client
                .connect_step_send_method(&access_token, &key, &value)
                .await?
        }
        Commands::Step {
            access_token,
            answer,
        } => client.connect_step(&access_token, &answer).await?,
        Commands::Get {
            access_token,
            pending,
            account,
            gte,
            lte,
        } => {
            let options = ConnectGetOptions {
                pending,
                account,
                gte,
                lte,
            };
            client.connect_get(&access_token, Some(&options)).await?
        }
        Commands::Update {
            access_token,
            credentials,
        } => {
            client
                .connect_update(&access_token, &credentials.into())
                .await?
        }
        Commands::UpdateStep {
            access_token,
            credentials,
            mfa,
        } => {
            client
                .connect_update_step(&access_token, &credentials.into(), &mfa)
                .await?
        }
        Commands::Delete { access_token } => {
            let response = client.connect_delete(&access_token).await?;
            println!("{}", response.message);
            return Ok(());
        }
    };

    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &ConnectOutcome) {
    println!("access_token={}", outcome.access_token());
    match outcome {
        ConnectOutcome::Connected(response) => {
            for account in &response.accounts {
                println!(
                    "account {} | {} | available {:?}",
                    account.id,
                    account.account_type.as_deref().unwrap_or("-"),
                    account.balance.available
                );
            }
            for txn in &response.transactions {
                println!(
                    "{} | {} {} {}",
                    txn.id,
                    txn.date,
                    txn.amount,
                    txn.name.as_deref().unwrap_or("")
                );
            }
        }
        ConnectOutcome::MfaRequired(mfa) => match &mfa.challenge {
            MfaChallenge::Questions(questions) => {
                for q in questions {
                    println!("question: {}", q.question);
                }
            }
            MfaChallenge::List(methods) => {
                for m in methods {
                    println!("send method: {} ({})", m.mask, m.method_type);
                }
            }
            MfaChallenge::Device(device) => println!("device: {}", device.message),
            MfaChallenge::Selections(selections) => {
                for s in selections {
                    println!("selection: {} {:?}", s.question, s.answers);
                }
            }
            MfaChallenge::Other { kind, mfa } => println!("{kind}: {mfa}"),
        },
    }
}
