//! JEE Buddy 客户端命令行入口

use clap::{Parser, Subcommand};
use jee_buddy_client::{config::ClientConfig, telemetry, ClientError, JeeClient};

#[derive(Parser)]
#[command(name = "jee-buddy-client", version, about = "JEE Buddy API client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 邮箱密码登录
    Login {
        #[arg(long)]
        email: String,
        /// 未提供时读取 JEE_PASSWORD
        #[arg(long, env = "JEE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// 注册新账号
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "JEE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// 用 OAuth 授权码完成 Google 登录
    GoogleCallback {
        #[arg(long)]
        code: String,
    },
    /// 请求密码重置邮件
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// 用邮件中的令牌设置新密码
    ResetPassword {
        #[arg(long)]
        token: String,
        #[arg(long, env = "JEE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// 登出并清除本地凭证
    Logout,
    /// 显示当前会话状态
    Status,
    /// 以当前会话发送 GET 请求并打印 JSON
    Get {
        /// 接口路径，例如 /books
        path: String,
        /// 查询参数 key=value，可重复
        #[arg(long = "query", short = 'q', value_parser = parse_query)]
        query: Vec<(String, String)>,
    },
}

fn parse_query(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 加载 .env 文件（开发环境）
    if let Ok(env) = std::env::var("JEE_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::dotenv().ok();
    }

    let config = ClientConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    telemetry::init_telemetry(&config.logging);

    let client = JeeClient::from_config(config)?;

    match run(&client, cli.command).await {
        Ok(()) => Ok(()),
        Err(e) if e.requires_login() => {
            eprintln!("{}", e.user_message());
            eprintln!("Run `jee-buddy-client login` to sign in again.");
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

async fn run(client: &JeeClient, command: Command) -> Result<(), ClientError> {
    let session = client.session();

    match command {
        Command::Login { email, password } => {
            let response = session.login(&email, &password).await?;
            print_login(response.user.as_ref(), response.tokens.access_expiry());
        }
        Command::Register {
            name,
            email,
            password,
        } => {
            let response = session.register(&name, &email, &password).await?;
            print_login(response.user.as_ref(), response.tokens.access_expiry());
        }
        Command::GoogleCallback { code } => {
            let response = session.complete_google_sign_in(&code).await?;
            print_login(response.user.as_ref(), response.tokens.access_expiry());
        }
        Command::ForgotPassword { email } => {
            session.forgot_password(&email).await?;
            println!("If the account exists, a reset email has been sent");
        }
        Command::ResetPassword { token, password } => {
            session.reset_password(&token, &password).await?;
            println!("Password updated, log in with the new password");
        }
        Command::Logout => {
            session.logout().await?;
            println!("Logged out");
        }
        Command::Status => match session.current_tokens().await {
            Some(tokens) => {
                let user = session.current_user().await;
                println!(
                    "Authenticated as {}",
                    user.map(|u| u.email).unwrap_or_else(|| "<unknown user>".to_string())
                );
                println!("Access token expires:  {}", tokens.access_expiry());
                println!("Refresh token expires: {}", tokens.refresh_expiry());
            }
            None => println!("Not authenticated"),
        },
        Command::Get { path, query } => {
            let mut request = jee_buddy_client::gate::ApiRequest::get(path);
            for (key, value) in query {
                request = request.query(key, value);
            }
            let response = client.gate().send(request).await?;
            let body: serde_json::Value = response.json().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string())
            );
        }
    }

    Ok(())
}

fn print_login(
    user: Option<&jee_buddy_client::models::UserProfile>,
    expires: chrono::DateTime<chrono::Utc>,
) {
    match user {
        Some(user) => println!("Logged in as {}", user.email),
        None => println!("Logged in"),
    }
    println!("Access token expires: {}", expires);
}
