use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};

use crate::AppPaths;

use super::database::{merge_source_defs, FindSpec, MergedRawDefs, RawAreaDef, RawItemDef, RawStep, RawTaskDef};
use super::discovery::discover_sources;
use super::hashing::collect_xml_files_sorted;
use super::types::{ContentPlanError, ContentPlanRequest};
use super::HidingKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    Discovery,
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDefInMod,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub mod_id: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (mod={}, file={}, line={}, column={})",
                self.code,
                self.message,
                self.mod_id,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (mod={}, file={})",
                self.code,
                self.message,
                self.mod_id,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

pub(crate) fn compile_merged_raw_defs(
    app_paths: &AppPaths,
    request: &ContentPlanRequest,
) -> Result<MergedRawDefs, ContentCompileError> {
    let sources = discover_sources(app_paths, request)
        .map_err(|error| map_discovery_error(error, &app_paths.root))?;

    let mut per_source = Vec::with_capacity(sources.len());
    for source in &sources {
        per_source.push(compile_source_defs(&source.source_dir, &source.mod_id)?);
    }
    Ok(merge_source_defs(per_source))
}

pub(crate) fn compile_source_defs(
    source_dir: &Path,
    mod_id: &str,
) -> Result<MergedRawDefs, ContentCompileError> {
    let xml_files = collect_xml_files_sorted(source_dir)
        .map_err(|error| map_discovery_error(error, source_dir))?;

    let mut defs = MergedRawDefs::default();
    let mut seen_items = HashSet::<String>::new();
    let mut seen_tasks = HashSet::<String>::new();
    let mut seen_areas = HashSet::<String>::new();

    for (_, xml_file) in xml_files {
        let raw = fs::read_to_string(&xml_file).map_err(|source_err| ContentCompileError {
            code: ContentErrorCode::ReadFile,
            message: format!("failed to read XML file: {source_err}"),
            mod_id: mod_id.to_string(),
            file_path: xml_file.clone(),
            location: None,
        })?;
        parse_defs_document(mod_id, &xml_file, &raw, &mut defs, &mut seen_items, &mut seen_tasks, &mut seen_areas)?;
    }

    Ok(defs)
}

#[allow(clippy::too_many_arguments)]
fn parse_defs_document(
    mod_id: &str,
    file_path: &Path,
    raw: &str,
    defs: &mut MergedRawDefs,
    seen_items: &mut HashSet<String>,
    seen_tasks: &mut HashSet<String>,
    seen_areas: &mut HashSet<String>,
) -> Result<(), ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        mod_id: mod_id.to_string(),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(error_at_node(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            mod_id,
            file_path,
            &doc,
            root,
        ));
    }

    for child in root.children().filter(|node| node.is_element()) {
        match child.tag_name().name() {
            "ItemDef" => {
                let item = parse_item_def(mod_id, file_path, &doc, child)?;
                check_unique(mod_id, file_path, "ItemDef", &item.def_name, seen_items)?;
                defs.items.push(item);
            }
            "TaskDef" => {
                let task = parse_task_def(mod_id, file_path, &doc, child)?;
                check_unique(mod_id, file_path, "TaskDef", &task.def_name, seen_tasks)?;
                defs.tasks.push(task);
            }
            "AreaDef" => {
                let area = parse_area_def(mod_id, file_path, &doc, child)?;
                check_unique(mod_id, file_path, "AreaDef", &area.def_name, seen_areas)?;
                defs.areas.push(area);
            }
            other => {
                return Err(error_at_node(
                    ContentErrorCode::UnknownDefType,
                    format!(
                        "unsupported def type <{other}>; supported: ItemDef, TaskDef, AreaDef"
                    ),
                    mod_id,
                    file_path,
                    &doc,
                    child,
                ));
            }
        }
    }

    Ok(())
}

fn check_unique(
    mod_id: &str,
    file_path: &Path,
    def_type: &str,
    def_name: &str,
    seen: &mut HashSet<String>,
) -> Result<(), ContentCompileError> {
    if !seen.insert(def_name.to_string()) {
        return Err(ContentCompileError {
            code: ContentErrorCode::DuplicateDefInMod,
            message: format!(
                "duplicate {def_type} '{def_name}' in mod '{mod_id}'; each mod may define a defName only once"
            ),
            mod_id: mod_id.to_string(),
            file_path: file_path.to_path_buf(),
            location: None,
        });
    }
    // Cross-mod duplicates are intentional override points (last mod wins).
    Ok(())
}

fn parse_item_def<'doc, 'input>(
    mod_id: &str,
    file_path: &Path,
    doc: &'doc Document<'input>,
    node: Node<'doc, 'input>,
) -> Result<RawItemDef, ContentCompileError> {
    let mut fields = FieldReader::new(mod_id, file_path, doc, node, "ItemDef");
    let mut def_name = None;
    let mut label = None;
    let mut icon = None;

    while let Some(field) = fields.next()? {
        match field.name.as_str() {
            "defName" => def_name = Some(fields.required_text(field.node, "defName")?),
            "label" => label = Some(fields.required_text(field.node, "label")?),
            "icon" => icon = Some(fields.required_text(field.node, "icon")?),
            _ => return Err(fields.unknown_field(&field)),
        }
    }

    Ok(RawItemDef {
        def_name: fields.require(def_name, "defName")?,
        label: fields.require(label, "label")?,
        icon,
    })
}

fn parse_task_def<'doc, 'input>(
    mod_id: &str,
    file_path: &Path,
    doc: &'doc Document<'input>,
    node: Node<'doc, 'input>,
) -> Result<RawTaskDef, ContentCompileError> {
    let mut fields = FieldReader::new(mod_id, file_path, doc, node, "TaskDef");
    let mut def_name = None;
    let mut label = None;
    let mut steps = None;

    while let Some(field) = fields.next()? {
        match field.name.as_str() {
            "defName" => def_name = Some(fields.required_text(field.node, "defName")?),
            "label" => label = Some(fields.required_text(field.node, "label")?),
            "steps" => {
                let mut parsed = Vec::new();
                for li in list_items(field.node) {
                    parsed.push(parse_step(mod_id, file_path, doc, li)?);
                }
                if parsed.is_empty() {
                    return Err(error_at_node(
                        ContentErrorCode::InvalidValue,
                        "a TaskDef must declare at least one step".to_string(),
                        mod_id,
                        file_path,
                        doc,
                        field.node,
                    ));
                }
                steps = Some(parsed);
            }
            _ => return Err(fields.unknown_field(&field)),
        }
    }

    Ok(RawTaskDef {
        def_name: fields.require(def_name, "defName")?,
        label: fields.require(label, "label")?,
        steps: fields.require(steps, "steps")?,
    })
}

fn parse_step<'doc, 'input>(
    mod_id: &str,
    file_path: &Path,
    doc: &'doc Document<'input>,
    node: Node<'doc, 'input>,
) -> Result<RawStep, ContentCompileError> {
    let mut fields = FieldReader::new(mod_id, file_path, doc, node, "steps li");
    let mut step_id = None;
    let mut target = None;
    let mut requires = Vec::new();
    let mut grants = Vec::new();
    let mut consumes = Vec::new();

    while let Some(field) = fields.next()? {
        match field.name.as_str() {
            "stepId" => step_id = Some(fields.required_text(field.node, "stepId")?),
            "target" => target = Some(fields.required_text(field.node, "target")?),
            "requires" => requires = comma_list(&fields.required_text(field.node, "requires")?),
            "grants" => grants = comma_list(&fields.required_text(field.node, "grants")?),
            "consumes" => consumes = comma_list(&fields.required_text(field.node, "consumes")?),
            _ => return Err(fields.unknown_field(&field)),
        }
    }

    Ok(RawStep {
        step_id: fields.require(step_id, "stepId")?,
        target: fields.require(target, "target")?,
        requires,
        grants,
        consumes,
    })
}

fn parse_area_def<'doc, 'input>(
    mod_id: &str,
    file_path: &Path,
    doc: &'doc Document<'input>,
    node: Node<'doc, 'input>,
) -> Result<RawAreaDef, ContentCompileError> {
    let mut fields = FieldReader::new(mod_id, file_path, doc, node, "AreaDef");
    let mut def_name = None;
    let mut label = None;
    let mut boy_tasks = Vec::new();
    let mut girl_tasks = Vec::new();
    let mut manifest = Vec::new();
    let mut finds = Vec::new();
    let mut postcard_trigger = None;
    let mut audio_zone = None;
    let mut placeholder = false;

    while let Some(field) = fields.next()? {
        match field.name.as_str() {
            "defName" => def_name = Some(fields.required_text(field.node, "defName")?),
            "label" => label = Some(fields.required_text(field.node, "label")?),
            "boyTasks" => boy_tasks = text_list(mod_id, file_path, doc, field.node, "boyTasks")?,
            "girlTasks" => girl_tasks = text_list(mod_id, file_path, doc, field.node, "girlTasks")?,
            "manifest" => manifest = text_list(mod_id, file_path, doc, field.node, "manifest")?,
            "finds" => {
                for li in list_items(field.node) {
                    finds.push(parse_find(mod_id, file_path, doc, li)?);
                }
            }
            "postcardTrigger" => {
                postcard_trigger = Some(fields.required_text(field.node, "postcardTrigger")?)
            }
            "audioZone" => audio_zone = Some(fields.required_text(field.node, "audioZone")?),
            "placeholder" => {
                let value = fields.required_text(field.node, "placeholder")?;
                placeholder = match value.as_str() {
                    "true" => true,
                    "false" => false,
                    _ => {
                        return Err(error_at_node(
                            ContentErrorCode::InvalidValue,
                            format!("placeholder '{value}' is not a boolean"),
                            mod_id,
                            file_path,
                            doc,
                            field.node,
                        ))
                    }
                };
            }
            _ => return Err(fields.unknown_field(&field)),
        }
    }

    Ok(RawAreaDef {
        def_name: fields.require(def_name, "defName")?,
        label: fields.require(label, "label")?,
        boy_tasks,
        girl_tasks,
        manifest,
        finds,
        postcard_trigger,
        audio_zone,
        placeholder,
    })
}

fn parse_find<'doc, 'input>(
    mod_id: &str,
    file_path: &Path,
    doc: &'doc Document<'input>,
    node: Node<'doc, 'input>,
) -> Result<FindSpec, ContentCompileError> {
    let mut fields = FieldReader::new(mod_id, file_path, doc, node, "finds li");
    let mut find_id = None;
    let mut hiding = None;

    while let Some(field) = fields.next()? {
        match field.name.as_str() {
            "findId" => find_id = Some(fields.required_text(field.node, "findId")?),
            "hiding" => {
                let token = fields.required_text(field.node, "hiding")?;
                let parsed = HidingKind::parse_token(&token).ok_or_else(|| {
                    error_at_node(
                        ContentErrorCode::InvalidValue,
                        format!(
                            "invalid hiding '{token}'; allowed: edge, under, inOn, landmark, skillGated"
                        ),
                        mod_id,
                        file_path,
                        doc,
                        field.node,
                    )
                })?;
                hiding = Some(parsed);
            }
            _ => return Err(fields.unknown_field(&field)),
        }
    }

    Ok(FindSpec {
        find_id: fields.require(find_id, "findId")?,
        hiding: fields.require(hiding, "hiding")?,
    })
}

struct ParsedField<'doc, 'input> {
    name: String,
    node: Node<'doc, 'input>,
}

/// Shared per-def field walk: rejects duplicate fields, reports missing
/// required ones with the def's location.
struct FieldReader<'a, 'doc, 'input> {
    mod_id: &'a str,
    file_path: &'a Path,
    doc: &'a Document<'input>,
    def_node: Node<'doc, 'input>,
    def_type: &'static str,
    children: Vec<Node<'doc, 'input>>,
    cursor: usize,
    seen: HashSet<String>,
}

impl<'a, 'doc, 'input> FieldReader<'a, 'doc, 'input> {
    fn new(
        mod_id: &'a str,
        file_path: &'a Path,
        doc: &'a Document<'input>,
        def_node: Node<'doc, 'input>,
        def_type: &'static str,
    ) -> Self {
        let children = def_node
            .children()
            .filter(|child| child.is_element())
            .collect();
        Self {
            mod_id,
            file_path,
            doc,
            def_node,
            def_type,
            children,
            cursor: 0,
            seen: HashSet::new(),
        }
    }

    fn next(&mut self) -> Result<Option<ParsedField<'doc, 'input>>, ContentCompileError> {
        let Some(node) = self.children.get(self.cursor).copied() else {
            return Ok(None);
        };
        self.cursor += 1;
        let name = node.tag_name().name().to_string();
        if !self.seen.insert(name.clone()) {
            return Err(error_at_node(
                ContentErrorCode::DuplicateField,
                format!("duplicate field <{}> in <{}>", name, self.def_type),
                self.mod_id,
                self.file_path,
                self.doc,
                node,
            ));
        }
        Ok(Some(ParsedField { name, node }))
    }

    fn required_text(
        &self,
        node: Node<'_, '_>,
        field_name: &str,
    ) -> Result<String, ContentCompileError> {
        let value = node.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(error_at_node(
                ContentErrorCode::MissingField,
                format!("field <{field_name}> must not be empty"),
                self.mod_id,
                self.file_path,
                self.doc,
                node,
            ));
        }
        Ok(value)
    }

    fn require<T>(&self, value: Option<T>, field_name: &str) -> Result<T, ContentCompileError> {
        value.ok_or_else(|| {
            error_at_node(
                ContentErrorCode::MissingField,
                format!(
                    "missing required field <{field_name}> in <{}>",
                    self.def_type
                ),
                self.mod_id,
                self.file_path,
                self.doc,
                self.def_node,
            )
        })
    }

    fn unknown_field(&self, field: &ParsedField<'_, '_>) -> ContentCompileError {
        error_at_node(
            ContentErrorCode::UnknownField,
            format!("unknown field <{}> in <{}>", field.name, self.def_type),
            self.mod_id,
            self.file_path,
            self.doc,
            field.node,
        )
    }
}

fn list_items<'doc, 'input>(node: Node<'doc, 'input>) -> Vec<Node<'doc, 'input>> {
    node.children()
        .filter(|child| child.is_element() && child.tag_name().name() == "li")
        .collect()
}

fn text_list(
    mod_id: &str,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<Vec<String>, ContentCompileError> {
    let mut values = Vec::new();
    for li in list_items(node) {
        let value = li.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(error_at_node(
                ContentErrorCode::MissingField,
                format!("<{field_name}> list item must not be empty"),
                mod_id,
                file_path,
                doc,
                li,
            ));
        }
        values.push(value);
    }
    Ok(values)
}

fn comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn error_at_node(
    code: ContentErrorCode,
    message: String,
    mod_id: &str,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> ContentCompileError {
    let pos = doc.text_pos_at(node.range().start);
    ContentCompileError {
        code,
        message,
        mod_id: mod_id.to_string(),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}

fn map_discovery_error(error: ContentPlanError, root: &Path) -> ContentCompileError {
    match error {
        ContentPlanError::EnabledModMissing {
            mod_id,
            expected_dir,
        } => ContentCompileError {
            code: ContentErrorCode::Discovery,
            message: format!(
                "enabled mod '{}' not found at {}; check enabled mod list",
                mod_id,
                expected_dir.display()
            ),
            mod_id,
            file_path: expected_dir,
            location: None,
        },
        other => ContentCompileError {
            code: ContentErrorCode::Discovery,
            message: other.to_string(),
            mod_id: "<discovery>".to_string(),
            file_path: root.to_path_buf(),
            location: None,
        },
    }
}
