// Template Registry: declarative request definitions keyed by command name.
//
// A template file `<COMMAND>.json` holds either one definition object or an
// ordered list of them (multi-step commands such as ADMIN_LOGIN). Any entry
// may carry a `req_objects` map of named payload bodies. Search paths are
// tried in order and the first directory containing the file wins; the
// templates compiled into the crate are consulted last.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::Error;
use crate::request::{HttpMethod, common_headers};

const TEMPLATE_EXTENSION: &str = "json";

/// Templates compiled into the crate.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("ADMIN_LOGIN", include_str!("../templates/ADMIN_LOGIN.json")),
    ("GET_INDEX_JSP", include_str!("../templates/GET_INDEX_JSP.json")),
    ("HEARTBEAT_STATUS", include_str!("../templates/HEARTBEAT_STATUS.json")),
    ("SERVICE_STATUS", include_str!("../templates/SERVICE_STATUS.json")),
    ("GET_HA_TYPE", include_str!("../templates/GET_HA_TYPE.json")),
    ("DOWNLOAD_BACKUP", include_str!("../templates/DOWNLOAD_BACKUP.json")),
];

/// Command name of the two-step login template.
pub const ADMIN_LOGIN: &str = "ADMIN_LOGIN";

// ── Definition ──────────────────────────────────────────────────────

/// One declarative HTTP call.
///
/// `headers` already contains the method's common headers with the
/// template's own headers layered on top.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    /// Controller mode; 0 means the request carries no body fields.
    pub mode: i64,
    /// Controller operation; 0 means none.
    pub operation: i64,
    /// Value of the `requestObj` field: a name, or an inline object.
    pub request_object: Option<Value>,
    pub path: String,
    pub method: HttpMethod,
    pub headers: IndexMap<String, String>,
    /// `true` for GET or when the template asks for it.
    pub urlencode: bool,
    pub separator: Option<String>,
}

impl Definition {
    /// `requestObj` as sent on the wire: names verbatim, objects as compact JSON.
    pub fn request_object_text(&self) -> Option<String> {
        match self.request_object.as_ref()? {
            Value::Null => None,
            Value::String(name) if name.is_empty() => None,
            Value::String(name) => Some(name.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDefinition {
    #[serde(default, alias = "req_mode")]
    mode: i64,
    #[serde(default, alias = "req_operation")]
    operation: i64,
    #[serde(default, alias = "req_object", alias = "requestObj")]
    request_object: Option<Value>,
    #[serde(default, alias = "web_path")]
    path: Option<String>,
    #[serde(default, alias = "web_method")]
    method: HttpMethod,
    #[serde(default, alias = "web_headers")]
    headers: IndexMap<String, Value>,
    #[serde(default)]
    urlencode: Option<bool>,
    #[serde(default)]
    separator: Option<String>,
    #[serde(default)]
    req_objects: IndexMap<String, Value>,
}

impl RawDefinition {
    fn into_definition(self) -> (Definition, IndexMap<String, Value>) {
        let mut headers = common_headers(self.method);
        for (name, value) in self.headers {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            headers.insert(name, value);
        }

        let definition = Definition {
            mode: self.mode,
            operation: self.operation,
            request_object: self.request_object,
            path: self
                .path
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| "{PATH_CONTROLLER}".to_owned()),
            method: self.method,
            headers,
            urlencode: self.urlencode.unwrap_or(false) || self.method == HttpMethod::Get,
            separator: self.separator,
        };
        (definition, self.req_objects)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTemplate {
    Sequence(Vec<RawDefinition>),
    Single(Box<RawDefinition>),
}

// ── DefinitionSet ───────────────────────────────────────────────────

/// What a command name resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionSet {
    Single(Definition),
    /// Ordered steps, dispatched in sequence on one session.
    Sequence(Vec<Definition>),
}

impl DefinitionSet {
    pub fn definitions(&self) -> &[Definition] {
        match self {
            Self::Single(def) => std::slice::from_ref(def),
            Self::Sequence(defs) => defs,
        }
    }

    pub fn len(&self) -> usize {
        self.definitions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions().is_empty()
    }

    /// Set the `requestObj` of every step.
    pub fn with_request_object(mut self, object: &Value) -> Self {
        match &mut self {
            Self::Single(def) => def.request_object = Some(object.clone()),
            Self::Sequence(defs) => {
                for def in defs {
                    def.request_object = Some(object.clone());
                }
            }
        }
        self
    }
}

/// A parsed template file.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub definitions: DefinitionSet,
    /// Named payload bodies, merged across all steps.
    pub request_objects: IndexMap<String, Value>,
    /// File the template came from; `None` for compiled-in templates.
    pub source: Option<PathBuf>,
}

impl Template {
    /// Parse template text.
    pub fn parse(name: &str, text: &str, source: Option<PathBuf>) -> Result<Self, Error> {
        let raw: RawTemplate = serde_json::from_str(text).map_err(|e| Error::Template {
            name: name.to_owned(),
            message: e.to_string(),
        })?;

        let mut request_objects = IndexMap::new();
        let mut collect = |raw: RawDefinition| {
            let (def, objects) = raw.into_definition();
            request_objects.extend(objects);
            def
        };

        let definitions = match raw {
            RawTemplate::Single(raw) => DefinitionSet::Single(collect(*raw)),
            RawTemplate::Sequence(raws) if raws.is_empty() => {
                return Err(Error::Template {
                    name: name.to_owned(),
                    message: "template contains no definitions".into(),
                });
            }
            RawTemplate::Sequence(raws) => {
                DefinitionSet::Sequence(raws.into_iter().map(&mut collect).collect())
            }
        };

        Ok(Self {
            name: name.to_owned(),
            definitions,
            request_objects,
            source,
        })
    }
}

// ── Registry ────────────────────────────────────────────────────────

/// Loads and caches templates by command name.
///
/// Templates are read lazily on first use and kept for the registry's
/// lifetime. The registry is `Sync` and meant to be shared behind an `Arc`
/// by every Connector in the process.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    search_paths: Vec<PathBuf>,
    cache: DashMap<String, Arc<Template>>,
}

impl TemplateRegistry {
    /// Registry that only knows the compiled-in templates.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Registry searching `paths` in order before the compiled-in templates.
    pub fn with_search_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            search_paths: paths.into_iter().collect(),
            cache: DashMap::new(),
        }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Resolve a command name to its template.
    pub fn template(&self, command: &str) -> Result<Arc<Template>, Error> {
        let command = command
            .strip_suffix(".json")
            .unwrap_or(command)
            .to_owned();

        if let Some(cached) = self.cache.get(&command) {
            return Ok(Arc::clone(&cached));
        }

        let template = Arc::new(self.read(&command)?);
        self.cache.insert(command, Arc::clone(&template));
        Ok(template)
    }

    fn read(&self, command: &str) -> Result<Template, Error> {
        let filename = format!("{command}.{TEMPLATE_EXTENSION}");

        for dir in &self.search_paths {
            let path = dir.join(&filename);
            if !path.is_file() {
                trace!(path = %path.display(), "template not in search path");
                continue;
            }
            debug!(command, path = %path.display(), "loading template");
            let text = std::fs::read_to_string(&path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            return Template::parse(command, &text, Some(path));
        }

        if let Some((_, text)) = BUILTIN_TEMPLATES.iter().find(|(name, _)| *name == command) {
            debug!(command, "loading built-in template");
            return Template::parse(command, text, None);
        }

        Err(Error::DefinitionNotFound {
            name: command.to_owned(),
            searched: self.search_paths.clone(),
        })
    }

    /// Definition(s) for a command.
    pub fn load(&self, command: &str) -> Result<DefinitionSet, Error> {
        Ok(self.template(command)?.definitions.clone())
    }

    /// Named payload body registered under a command.
    pub fn load_request_object(&self, command: &str, object: &str) -> Result<Value, Error> {
        let template = self.template(command)?;
        template
            .request_objects
            .get(object)
            .cloned()
            .ok_or_else(|| Error::NoMatchFound {
                expected: format!("request object '{object}' for '{}'", template.name),
            })
    }

    /// Every command name available across search paths and built-ins.
    pub fn commands(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = BUILTIN_TEMPLATES
            .iter()
            .map(|(name, _)| (*name).to_owned())
            .collect();

        for dir in &self.search_paths {
            names.extend(template_names(dir));
        }
        names.into_iter().collect()
    }
}

fn template_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        trace!(dir = %dir.display(), "template directory not readable");
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == TEMPLATE_EXTENSION))
        .filter_map(|path| path.file_stem()?.to_str().map(str::to_owned))
        .collect()
}
