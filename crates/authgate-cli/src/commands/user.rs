//! User management commands.

use anyhow::{Context, Result};
use authgate_core::{Config, Password};
use authgate_gateway::auth::{User, UserStore, setup::generate_password};

use crate::ui;

/// Authority marking administrators.
const ADMIN_AUTHORITY: &str = "ROLE_ADMIN";

/// Length of generated passwords.
const GENERATED_PASSWORD_LEN: usize = 20;

/// User actions.
pub enum UserAction {
    /// Create a new user.
    Create {
        username: String,
        authorities: Vec<String>,
        password: Option<String>,
        generate_password: bool,
        email: Option<String>,
        display_name: Option<String>,
    },
    /// List all users.
    List,
    /// Reset a user's password.
    ResetPassword { username: String },
    /// Enable or disable an account.
    SetEnabled { username: String, enabled: bool },
    /// Delete a user.
    Delete { username: String, yes: bool },
}

/// Open the user store configured in `config`.
fn open_store(config: &Config) -> Result<UserStore> {
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;

    tracing::debug!(data_dir = %data_dir.display(), "opening user store");
    UserStore::open(&data_dir).map_err(|e| anyhow::anyhow!("Failed to open user store: {e}"))
}

/// Run a user command.
///
/// # Errors
///
/// Returns error if the operation fails.
pub fn run_user(config: &Config, action: UserAction) -> Result<()> {
    let store = open_store(config)?;

    match action {
        UserAction::Create {
            username,
            authorities,
            password,
            generate_password: gen_pwd,
            email,
            display_name,
        } => {
            let password = resolve_password(password, gen_pwd)?;
            create_user(&store, &username, &password, authorities, email, display_name)?;
        }
        UserAction::List => list_users(&store)?,
        UserAction::ResetPassword { username } => reset_password(&store, &username)?,
        UserAction::SetEnabled { username, enabled } => {
            store
                .set_enabled(&username, enabled)
                .map_err(|e| anyhow::anyhow!("Failed to update user: {e}"))?;
            let status = if enabled { "enabled" } else { "disabled" };
            ui::success(&format!("User '{username}' {status}"));
        }
        UserAction::Delete { username, yes } => {
            if !yes && !ui::prompts::confirm(&format!("Delete user '{username}'?"))? {
                ui::info("Delete cancelled");
                return Ok(());
            }
            delete_user(&store, &username)?;
        }
    }

    Ok(())
}

fn resolve_password(password: Option<String>, generate: bool) -> Result<Password> {
    if generate {
        let password = generate_password(GENERATED_PASSWORD_LEN);
        ui::success(&format!("Generated password: {}", password.expose()));
        return Ok(password);
    }

    match password {
        Some(password) => Ok(Password::new(password)),
        None => Ok(Password::new(ui::prompts::new_password("Password")?)),
    }
}

fn create_user(
    store: &UserStore,
    username: &str,
    password: &Password,
    authorities: Vec<String>,
    email: Option<String>,
    display_name: Option<String>,
) -> Result<User> {
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    let mut user = User::new(username, password, authorities)
        .map_err(|e| anyhow::anyhow!("Failed to create user: {e}"))?;
    user.email = email;
    user.display_name = display_name;

    store
        .create(&user)
        .map_err(|e| anyhow::anyhow!("Failed to save user: {e}"))?;

    let granted: Vec<&str> = user.authorities.iter().map(String::as_str).collect();
    ui::success(&format!(
        "Created user '{}' with authorities {}",
        user.username,
        granted.join(", ")
    ));

    Ok(user)
}

fn list_users(store: &UserStore) -> Result<()> {
    let users = store
        .list()
        .map_err(|e| anyhow::anyhow!("Failed to list users: {e}"))?;

    if users.is_empty() {
        ui::info("No users configured.");
        ui::info(
            "Run 'authgate user create --username admin --authority ROLE_ADMIN \
             --generate-password'",
        );
        return Ok(());
    }

    ui::info(&format!("Users ({}):", users.len()));
    println!();
    println!(
        "{:<20} {:<28} {:<8} {:<20} {:<20}",
        "USERNAME", "AUTHORITIES", "ENABLED", "CREATED", "LAST LOGIN"
    );
    println!("{}", "-".repeat(96));

    for user in users {
        let authorities: Vec<&str> = user.authorities.iter().map(String::as_str).collect();
        let enabled = if user.enabled { "yes" } else { "no" };
        let last_login = user
            .last_login
            .map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        println!(
            "{:<20} {:<28} {:<8} {:<20} {:<20}",
            user.username,
            authorities.join(","),
            enabled,
            user.created_at.format("%Y-%m-%d %H:%M"),
            last_login
        );
    }

    Ok(())
}

fn reset_password(store: &UserStore, username: &str) -> Result<()> {
    let new_password = generate_password(GENERATED_PASSWORD_LEN);

    store
        .set_password(username, &new_password)
        .map_err(|e| anyhow::anyhow!("Failed to reset password: {e}"))?;

    ui::success(&format!("Password reset for user '{username}'"));
    ui::success(&format!("New password: {}", new_password.expose()));

    Ok(())
}

fn delete_user(store: &UserStore, username: &str) -> Result<()> {
    let user = store
        .get_by_username(username)
        .map_err(|e| anyhow::anyhow!("Failed to find user: {e}"))?
        .ok_or_else(|| anyhow::anyhow!("User not found: {username}"))?;

    let users = store
        .list()
        .map_err(|e| anyhow::anyhow!("Failed to list users: {e}"))?;
    let admin_count = users
        .iter()
        .filter(|u| u.enabled && u.authorities.contains(ADMIN_AUTHORITY))
        .count();

    if user.enabled && user.authorities.contains(ADMIN_AUTHORITY) && admin_count <= 1 {
        anyhow::bail!("Cannot delete the last admin user");
    }

    store
        .delete(&user.username)
        .map_err(|e| anyhow::anyhow!("Failed to delete user: {e}"))?;

    ui::success(&format!("Deleted user '{}'", user.username));

    Ok(())
}
