// config.rs — `lt-byrole check-config` and `lt-byrole init-config`.

use anyhow::Context;
use lt_byrole::TriggerConfig;

use super::{format_span, CliContext};

pub fn check(ctx: &CliContext) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    config
        .validate()
        .with_context(|| format!("{} is not usable", ctx.config_path.display()))?;

    println!("{} is valid.", ctx.config_path.display());
    println!("  responsible roles: {}", config.responsible_roles);
    println!(
        "  delay:             {} ({}s)",
        format_span(chrono::Duration::seconds(config.delay_secs as i64)),
        config.delay_secs
    );
    println!("  inherited roles:   {}", config.include_inherited_roles);
    println!("  invert:            {}", config.invert);
    println!("  mode:              {:?}", config.mode);
    println!("  tracking:          {:?}", config.tracking);
    Ok(())
}

pub fn init(ctx: &CliContext, force: bool) -> anyhow::Result<()> {
    let path = &ctx.config_path;
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    std::fs::write(path, TriggerConfig::recommended().to_toml_string())
        .with_context(|| format!("cannot write {}", path.display()))?;
    println!("Wrote {}.", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lt_byrole::{ConfigProvider, RoleSet};
    use tempfile::tempdir;

    #[test]
    fn init_writes_a_config_that_checks() {
        let dir = tempdir().unwrap();
        let ctx = CliContext::new(dir.path().join("lt-byrole.toml"), dir.path().join("state"));

        init(&ctx, false).unwrap();
        check(&ctx).unwrap();

        let config = ctx.load_config().unwrap();
        assert_eq!(
            config.responsible_roles().unwrap(),
            RoleSet::parse("teacher,editingteacher")
        );
        assert_eq!(config.delay_secs, 2_419_200);
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempdir().unwrap();
        let ctx = CliContext::new(dir.path().join("lt-byrole.toml"), dir.path().join("state"));
        std::fs::write(&ctx.config_path, "responsible_roles = \"manager\"").unwrap();

        assert!(init(&ctx, false).is_err());
        init(&ctx, true).unwrap();
        assert_eq!(
            ctx.load_config().unwrap().responsible_roles,
            RoleSet::parse("teacher,editingteacher")
        );
    }

    #[test]
    fn check_rejects_empty_roles() {
        let dir = tempdir().unwrap();
        let ctx = CliContext::new(dir.path().join("lt-byrole.toml"), dir.path().join("state"));
        std::fs::write(&ctx.config_path, "responsible_roles = []\n").unwrap();

        let err = check(&ctx).unwrap_err();
        assert!(format!("{:#}", err).contains("no responsible roles"));
    }
}
