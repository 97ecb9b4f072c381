use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use engine::{
    compile_content_defs, resolve_app_paths, AppPaths, ContentDatabase, ContentPlanRequest,
    HidingKind, RoleTag, FINDS_PER_AREA,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintOptions {
    pub root: Option<PathBuf>,
    pub enabled_mods: Vec<String>,
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintWarning {
    pub subject: String,
    pub message: String,
}

impl fmt::Display for LintWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "warning: {}: {}", self.subject, self.message)
    }
}

#[derive(Debug)]
pub struct LintOutcome {
    pub report: String,
    pub warnings: Vec<LintWarning>,
}

pub fn parse_args(args: &[String]) -> Result<LintOptions, String> {
    let mut options = LintOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--root" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --root".to_string())?;
                options.root = Some(PathBuf::from(value));
                index += 2;
            }
            "--mods" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --mods".to_string())?;
                options.enabled_mods = value
                    .split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(ToString::to_string)
                    .collect();
                index += 2;
            }
            "--strict" => {
                options.strict = true;
                index += 1;
            }
            other => return Err(format!("unknown argument '{other}'")),
        }
    }
    Ok(options)
}

pub fn usage_text() -> String {
    [
        "content_lint - compile and validate Bramblewood content defs",
        "",
        "USAGE:",
        "  content_lint [--root <path>] [--mods <id,id>] [--strict]",
        "",
        "OPTIONS:",
        "  --root <path>   project root (defaults to BRAMBLE_ROOT / autodetect)",
        "  --mods <ids>    comma-separated enabled mod ids",
        "  --strict        treat lint warnings as failures",
    ]
    .join("\n")
}

pub fn run(options: &LintOptions) -> Result<LintOutcome, String> {
    let app_paths = match &options.root {
        Some(root) => AppPaths {
            root: root.clone(),
            base_content_dir: root.join("assets").join("base"),
            mods_dir: root.join("mods"),
            cache_dir: root.join("cache"),
        },
        None => resolve_app_paths().map_err(|error| error.to_string())?,
    };
    let request = ContentPlanRequest {
        enabled_mods: options.enabled_mods.clone(),
        compiler_version: env!("CARGO_PKG_VERSION").to_string(),
        game_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let database = compile_content_defs(&app_paths, &request).map_err(|error| error.to_string())?;
    Ok(LintOutcome {
        report: render_report(&database),
        warnings: lint_database(&database),
    })
}

/// Conventions the compiler deliberately does not enforce: the two-per-hiding
/// spread of an area's finds, and tasks that no area ever schedules.
pub fn lint_database(database: &ContentDatabase) -> Vec<LintWarning> {
    let mut warnings = Vec::new();

    for area in database.areas() {
        if area.placeholder {
            continue;
        }
        for hiding in HidingKind::ALL {
            let count = area
                .finds
                .iter()
                .filter(|find| find.hiding == hiding)
                .count();
            if count != FINDS_PER_AREA / HidingKind::ALL.len() {
                warnings.push(LintWarning {
                    subject: area.def_name.clone(),
                    message: format!(
                        "expected 2 '{}' finds, found {count}",
                        hiding.as_token()
                    ),
                });
            }
        }
        if area.postcard_trigger.is_none() {
            warnings.push(LintWarning {
                subject: area.def_name.clone(),
                message: "area has no postcard trigger".to_string(),
            });
        }
        if area.audio_zone.is_none() {
            warnings.push(LintWarning {
                subject: area.def_name.clone(),
                message: "area has no audio zone".to_string(),
            });
        }
    }

    let scheduled: HashSet<_> = database
        .areas()
        .iter()
        .flat_map(|area| {
            area.tasks_for(RoleTag::Boy)
                .iter()
                .chain(area.tasks_for(RoleTag::Girl))
                .copied()
        })
        .collect();
    for task in database.tasks() {
        if !scheduled.contains(&task.id) {
            warnings.push(LintWarning {
                subject: task.def_name.clone(),
                message: "task is not scheduled by any area".to_string(),
            });
        }
    }

    warnings
}

pub fn render_report(database: &ContentDatabase) -> String {
    let mut lines = vec![format!(
        "items={} tasks={} areas={}",
        database.items().len(),
        database.tasks().len(),
        database.areas().len()
    )];
    for area in database.areas() {
        lines.push(format!(
            "area={} label=\"{}\" boy_tasks={} girl_tasks={} manifest={} finds={} postcard={} audio={}{}",
            area.def_name,
            area.label,
            area.tasks_for(RoleTag::Boy).len(),
            area.tasks_for(RoleTag::Girl).len(),
            area.manifest.len(),
            area.finds.len(),
            area.postcard_trigger.as_deref().unwrap_or("-"),
            area.audio_zone.as_deref().unwrap_or("-"),
            if area.placeholder { " placeholder" } else { "" },
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parse_args_reads_root_mods_and_strict() {
        let options =
            parse_args(&args(&["--root", "/tmp/x", "--mods", "winter, autumn", "--strict"]))
                .expect("parse");
        assert_eq!(options.root.as_deref(), Some(Path::new("/tmp/x")));
        assert_eq!(
            options.enabled_mods,
            vec!["winter".to_string(), "autumn".to_string()]
        );
        assert!(options.strict);
    }

    #[test]
    fn parse_args_rejects_unknown_flags() {
        let error = parse_args(&args(&["--frobnicate"])).expect_err("unknown flag");
        assert!(error.contains("--frobnicate"));
    }

    #[test]
    fn parse_args_requires_values() {
        assert!(parse_args(&args(&["--root"])).is_err());
        assert!(parse_args(&args(&["--mods"])).is_err());
    }

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write");
    }

    fn seed_root(root: &Path, finds: &str) {
        write_file(
            &root.join("assets").join("base").join("defs.xml"),
            &format!(
                r#"<Defs>
                <TaskDef><defName>glade.boy.walk</defName><label>Walk</label>
                    <steps><li><stepId>walk</stepId><target>glade.path</target></li></steps>
                </TaskDef>
                <TaskDef><defName>glade.girl.skip</defName><label>Skip</label>
                    <steps><li><stepId>skip</stepId><target>glade.path</target></li></steps>
                </TaskDef>
                <TaskDef><defName>glade.unused</defName><label>Unused</label>
                    <steps><li><stepId>idle</stepId><target>glade.path</target></li></steps>
                </TaskDef>
                <AreaDef>
                    <defName>area.glade</defName><label>Glade</label>
                    <boyTasks><li>glade.boy.walk</li></boyTasks>
                    <girlTasks><li>glade.girl.skip</li></girlTasks>
                    <manifest><li>glade.path</li></manifest>
                    <finds>{finds}</finds>
                    <postcardTrigger>glade.bench</postcardTrigger>
                    <audioZone>glade.brook</audioZone>
                </AreaDef>
            </Defs>"#
            ),
        );
    }

    fn finds_xml(tokens: &[&str]) -> String {
        tokens
            .iter()
            .enumerate()
            .map(|(idx, hiding)| {
                format!("<li><findId>glade.find_{idx}</findId><hiding>{hiding}</hiding></li>")
            })
            .collect()
    }

    #[test]
    fn skewed_hiding_spread_and_unscheduled_task_warn() {
        let temp = TempDir::new().expect("temp");
        // Three edge finds and one under: breaks the two-per-kind spread.
        let tokens = [
            "edge",
            "edge",
            "edge",
            "under",
            "inOn",
            "inOn",
            "landmark",
            "landmark",
            "skillGated",
            "skillGated",
        ];
        seed_root(temp.path(), &finds_xml(&tokens));

        let outcome = run(&LintOptions {
            root: Some(temp.path().to_path_buf()),
            ..LintOptions::default()
        })
        .expect("lint runs");

        assert!(outcome
            .warnings
            .iter()
            .any(|warning| warning.subject == "area.glade"
                && warning.message.contains("'edge'")));
        assert!(outcome
            .warnings
            .iter()
            .any(|warning| warning.subject == "area.glade"
                && warning.message.contains("'under'")));
        assert!(outcome
            .warnings
            .iter()
            .any(|warning| warning.subject == "glade.unused"));
        assert!(outcome.report.contains("area=area.glade"));
    }

    #[test]
    fn balanced_content_produces_no_warnings() {
        let temp = TempDir::new().expect("temp");
        let tokens = [
            "edge",
            "edge",
            "under",
            "under",
            "inOn",
            "inOn",
            "landmark",
            "landmark",
            "skillGated",
            "skillGated",
        ];
        seed_root(temp.path(), &finds_xml(&tokens));

        let outcome = run(&LintOptions {
            root: Some(temp.path().to_path_buf()),
            ..LintOptions::default()
        })
        .expect("lint runs");
        let area_warnings: Vec<_> = outcome
            .warnings
            .iter()
            .filter(|warning| warning.subject == "area.glade")
            .collect();
        assert!(area_warnings.is_empty(), "unexpected: {area_warnings:?}");
    }

    #[test]
    fn invalid_content_is_an_error_not_a_warning() {
        let temp = TempDir::new().expect("temp");
        write_file(
            &temp.path().join("assets").join("base").join("defs.xml"),
            r#"<Defs>
                <AreaDef>
                    <defName>area.broken</defName><label>Broken</label>
                    <boyTasks><li>ghost.task</li></boyTasks>
                    <girlTasks><li>ghost.task</li></girlTasks>
                </AreaDef>
            </Defs>"#,
        );
        let error = run(&LintOptions {
            root: Some(temp.path().to_path_buf()),
            ..LintOptions::default()
        })
        .expect_err("invalid content");
        assert!(error.contains("ghost.task"));
    }
}
