//! Plan and checklist resolution.
//!
//! Plans are looked up as an explicit file, then under the user config
//! directory, then among the plans embedded in the binary. Checklists come
//! from the user config directory or the embedded set.

use std::fs;
use std::path::{Path, PathBuf};

use include_dir::{include_dir, Dir};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::models::plan::{CheckSpec, Checklist, EffectiveCheck, InitStage, InstallHookPolicy, Plan};

static BUILTIN_PLANS_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/builtin-plans");
static BUILTIN_CHECKLISTS_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/builtin-checklists");

pub const DEFAULT_PLAN: &str = "basic";

/// A plan with its checklists merged in, ready to build a scanner from.
#[derive(Debug, Clone)]
pub struct ResolvedPlan {
    pub name: String,
    /// Checklist stages in order, then the plan's own.
    pub init_stages: Vec<InitStage>,
    pub checks: Vec<EffectiveCheck>,
    pub pre_install: Vec<PathBuf>,
    pub hook_policy: InstallHookPolicy,
    pub enable_pre_install_hooks: bool,
}

fn parse_error(source_name: &str, message: impl ToString) -> ConfigError {
    ConfigError::Parse {
        source_name: source_name.to_string(),
        message: message.to_string(),
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("toml")
}

pub fn parse_plan_str(text: &str, source_name: &str, toml: bool) -> Result<Plan, ConfigError> {
    let mut plan: Plan = if toml {
        toml::from_str(text).map_err(|e| parse_error(source_name, e))?
    } else {
        serde_json::from_str(text).map_err(|e| parse_error(source_name, e))?
    };
    plan.name = Path::new(source_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(source_name)
        .to_string();
    Ok(plan)
}

pub fn parse_checklist_str(text: &str, source_name: &str) -> Result<Checklist, ConfigError> {
    serde_json::from_str(text).map_err(|e| parse_error(source_name, e))
}

fn load_plan_file(path: &Path) -> Result<Plan, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut plan = parse_plan_str(&text, &path.display().to_string(), is_toml(path))?;
    plan.base_dir = path.parent().map(Path::to_path_buf);
    Ok(plan)
}

fn user_dir(kind: &str) -> Option<PathBuf> {
    let mut dir = dirs_next::config_dir()?;
    dir.push("pkgvet");
    dir.push(kind);
    dir.is_dir().then_some(dir)
}

fn builtin_text<'a>(dir: &'a Dir<'a>, file: &str) -> Option<&'a str> {
    dir.get_file(file).and_then(|f| f.contents_utf8())
}

/// Resolves a plan reference; `None` selects the default plan.
pub fn load_plan(reference: Option<&str>) -> Result<Plan, ConfigError> {
    let reference = reference.unwrap_or(DEFAULT_PLAN);

    // 1. explicit file
    let path = Path::new(reference);
    if path.is_file() {
        debug!(plan = %path.display(), "loading plan file");
        return load_plan_file(path);
    }

    // 2. config dir
    if let Some(dir) = user_dir("plans") {
        for ext in ["json", "toml"] {
            let candidate = dir.join(format!("{reference}.{ext}"));
            if candidate.is_file() {
                debug!(plan = %candidate.display(), "loading user plan");
                return load_plan_file(&candidate);
            }
        }
    }

    // 3. built-in
    let file = format!("{reference}.json");
    match builtin_text(&BUILTIN_PLANS_DIR, &file) {
        Some(text) => parse_plan_str(text, &format!("builtin-plans/{file}"), false),
        None => Err(ConfigError::UnknownPlan(reference.to_string())),
    }
}

pub fn load_checklist(name: &str) -> Result<Checklist, ConfigError> {
    let file = format!("{name}.json");
    if let Some(dir) = user_dir("checklists") {
        let candidate = dir.join(&file);
        if candidate.is_file() {
            let text = fs::read_to_string(&candidate).map_err(|source| ConfigError::Io {
                path: candidate.clone(),
                source,
            })?;
            return parse_checklist_str(&text, &candidate.display().to_string());
        }
    }
    match builtin_text(&BUILTIN_CHECKLISTS_DIR, &file) {
        Some(text) => parse_checklist_str(text, &format!("builtin-checklists/{file}")),
        None => Err(ConfigError::UnknownChecklist(name.to_string())),
    }
}

/// Names of the embedded plans, sorted.
pub fn builtin_plans() -> Vec<String> {
    let mut names: Vec<String> = BUILTIN_PLANS_DIR
        .files()
        .filter_map(|f| f.path().file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .collect();
    names.sort();
    names
}

/// Shallow object merge; keys of `overrides` win.
fn merge_config(base: &Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            let mut merged = base.clone();
            for (k, v) in overrides {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        (base, Value::Null) => base.clone(),
        (_, overrides) => overrides.clone(),
    }
}

/// Fills the plan spec's gaps from `base`.
fn inherit(spec: &CheckSpec, base: &CheckSpec) -> CheckSpec {
    CheckSpec {
        name: spec.name.clone(),
        implementation: spec.implementation.clone().or_else(|| base.implementation.clone()),
        template: None,
        skip: false,
        config: merge_config(&base.config, &spec.config),
    }
}

/// Checklist checks in order, adjusted by the plan's own checks.
pub fn effective_checks(checklists: &[Checklist], plan_checks: &[CheckSpec]) -> Result<Vec<EffectiveCheck>, ConfigError> {
    let mut checks: Vec<EffectiveCheck> = checklists.iter().flat_map(Checklist::prefixed_checks).collect();

    for spec in plan_checks {
        if spec.skip {
            let before = checks.len();
            checks.retain(|c| !c.is_named(&spec.name));
            if checks.len() == before {
                warn!(check = %spec.name, "skip names no known check");
            }
            continue;
        }

        if let Some(template) = spec.template.as_deref() {
            let base = checks
                .iter()
                .find(|c| c.is_named(template))
                .ok_or_else(|| ConfigError::UnknownTemplate {
                    check: spec.name.clone(),
                    template: template.to_string(),
                })?;
            let derived = inherit(spec, &base.spec);
            derived.validate()?;
            checks.push(EffectiveCheck::unprefixed(derived));
            continue;
        }

        if let Some(existing) = checks.iter_mut().find(|c| c.is_named(&spec.name)) {
            let overridden = inherit(spec, &existing.spec);
            overridden.validate()?;
            existing.spec = overridden;
            continue;
        }

        spec.validate()?;
        checks.push(EffectiveCheck::unprefixed(spec.clone()));
    }
    Ok(checks)
}

fn resolve_pre_install(plan: &Plan) -> Vec<PathBuf> {
    plan.pre_install_urls
        .iter()
        .map(|url| {
            let path = PathBuf::from(url.strip_prefix("file:").unwrap_or(url));
            match &plan.base_dir {
                Some(base) if path.is_relative() => base.join(path),
                _ => path,
            }
        })
        .collect()
}

/// Merges the plan with its checklists, looked up through `lookup`.
pub fn resolve_with<F>(plan: &Plan, mut lookup: F) -> Result<ResolvedPlan, ConfigError>
where
    F: FnMut(&str) -> Result<Checklist, ConfigError>,
{
    let checklists = plan
        .checklists
        .iter()
        .map(|name| lookup(name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut init_stages: Vec<InitStage> = checklists.iter().map(|c| c.init.clone()).collect();
    init_stages.push(plan.init.clone());
    init_stages.retain(|stage| !stage.is_empty());

    Ok(ResolvedPlan {
        name: plan.name.clone(),
        init_stages,
        checks: effective_checks(&checklists, &plan.checks)?,
        pre_install: resolve_pre_install(plan),
        hook_policy: plan.install_hook_policy.unwrap_or_default(),
        enable_pre_install_hooks: plan.enable_pre_install_hooks,
    })
}

pub fn resolve(plan: &Plan) -> Result<ResolvedPlan, ConfigError> {
    resolve_with(plan, load_checklist)
}
