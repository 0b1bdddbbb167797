use anyhow::{bail, Context};
use chrono::{DateTime, Local, TimeZone};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tidemark_core::{AppConfig, AppConfigTrait};

/// A scaffolded migration file
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedMigration {
    pub path: PathBuf,
    pub module: String,
    pub struct_name: String,
    pub version: String,
}

pub async fn migration(name: &str, description: Option<String>, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => {
            dotenvy::dotenv().ok();
            AppConfig::from_env()
                .context("Failed to load configuration")?
                .migrations_dir
        }
    };

    let generated = create_migration(&dir, name, description.as_deref(), Local::now())?;

    println!("✓ Created migration: {}", generated.path.display());
    println!();
    println!("Register it in {}:", dir.join("mod.rs").display());
    println!("    mod {};", generated.module);
    println!("    Box::new({}::{}),", generated.module, generated.struct_name);
    println!();
    println!("Then implement check_can_apply(), upgrade() and, if it can be reverted, downgrade().");
    Ok(())
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9_]*[a-z0-9][a-z0-9_]*$").expect("name pattern is valid"))
}

/// Write a new migration skeleton into `dir`, versioned by `now`
pub fn create_migration<Tz: TimeZone>(
    dir: &Path,
    name: &str,
    description: Option<&str>,
    now: DateTime<Tz>,
) -> anyhow::Result<GeneratedMigration>
where
    Tz::Offset: std::fmt::Display,
{
    if !name_pattern().is_match(name) {
        bail!(
            "Invalid migration name '{}': use lowercase letters, digits and underscores (e.g. add_user_phone)",
            name
        );
    }

    let version = now.format("%Y%m%d_%H%M%S").to_string();
    let description = match description {
        Some(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => format!("Migration: {}", name.replace('_', " ")),
    };
    let module = format!("m{}_{}", version, name);
    let struct_name = format!("{}Migration", camel_case(name));
    let path = dir.join(format!("{}.rs", module));

    if path.exists() {
        bail!("Migration file already exists: {}", path.display());
    }

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    fs::write(&path, render(&version, &struct_name, &description))
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(GeneratedMigration {
        path,
        module,
        struct_name,
        version,
    })
}

fn camel_case(name: &str) -> String {
    let camel: String = name
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();

    // Struct names cannot start with a digit
    if camel.starts_with(|c: char| c.is_ascii_digit()) {
        format!("M{}", camel)
    } else {
        camel
    }
}

fn render(version: &str, struct_name: &str, description: &str) -> String {
    format!(
        r#"//! {description}

use tidemark_migrate::{{async_trait, DatabaseConnection, MigrateResult, Migration}};

pub struct {struct_name};

#[async_trait]
impl Migration for {struct_name} {{
    fn version(&self) -> &'static str {{
        "{version}"
    }}

    fn description(&self) -> &'static str {{
        {description_literal}
    }}

    async fn check_can_apply(&self, _conn: &mut dyn DatabaseConnection) -> MigrateResult<bool> {{
        // TODO: return false when the schema already has this change,
        // e.g. with tidemark_migrate::schema::column_exists
        Ok(true)
    }}

    async fn upgrade(&self, _conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {{
        // TODO: apply the schema change; keep statements safe to re-run
        Ok(())
    }}

    async fn downgrade(&self, _conn: &mut dyn DatabaseConnection) -> MigrateResult<()> {{
        // TODO: revert the schema change, or delete this method if it cannot be reverted
        Ok(())
    }}
}}
"#,
        description = description.replace('\n', " "),
        description_literal = format!("{:?}", description),
        struct_name = struct_name,
        version = version,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 25, 12, 15, 0).unwrap()
    }

    #[test]
    fn test_creates_versioned_file() {
        let dir = tempfile::tempdir().unwrap();
        let generated = create_migration(dir.path(), "add_user_phone", None, fixed_time()).unwrap();

        assert_eq!(generated.version, "20250825_121500");
        assert_eq!(generated.module, "m20250825_121500_add_user_phone");
        assert_eq!(generated.struct_name, "AddUserPhoneMigration");
        assert!(generated.path.ends_with("m20250825_121500_add_user_phone.rs"));

        let content = fs::read_to_string(&generated.path).unwrap();
        assert!(content.contains("pub struct AddUserPhoneMigration;"));
        assert!(content.contains("\"20250825_121500\""));
        assert!(content.contains("\"Migration: add user phone\""));
        assert!(content.contains("impl Migration for AddUserPhoneMigration {"));
    }

    #[test]
    fn test_custom_description_is_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let generated = create_migration(
            dir.path(),
            "quote_test",
            Some("Add \"quoted\" column"),
            fixed_time(),
        )
        .unwrap();

        let content = fs::read_to_string(&generated.path).unwrap();
        assert!(content.contains(r#""Add \"quoted\" column""#));
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        create_migration(dir.path(), "add_user_phone", None, fixed_time()).unwrap();
        let err = create_migration(dir.path(), "add_user_phone", None, fixed_time()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_rejects_invalid_names() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["AddPhone", "add-phone", "add phone", "", "___", "añadir"] {
            assert!(
                create_migration(dir.path(), bad, None, fixed_time()).is_err(),
                "accepted {bad:?}"
            );
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("add_user_phone"), "AddUserPhone");
        assert_eq!(camel_case("invitations"), "Invitations");
        assert_eq!(camel_case("2fa_codes"), "M2faCodes");
        assert_eq!(camel_case("double__underscore"), "DoubleUnderscore");
    }
}
