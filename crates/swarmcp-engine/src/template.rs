use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::error::Error as _;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use swarmcp_domain::SECRET_MOUNT_DIR;
use swarmcp_secrets::SecretResolver;
use tera::{Tera, Value};

use crate::error::RenderError;
use crate::fingerprint::fingerprint;

/// Which function set a template renders with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// `secretPath` only; secret contents are unreachable.
    Config,
    /// `secret`, `secretB64` and `secretPath`.
    Secret,
}

type SensitiveValues = Arc<Mutex<BTreeSet<String>>>;

fn lock_sensitive(sensitive: &SensitiveValues) -> tera::Result<MutexGuard<'_, BTreeSet<String>>> {
    sensitive
        .lock()
        .map_err(|_| tera::Error::msg("internal error: sensitive value collector lock poisoned"))
}

/// Two template roots sharing a utility library but not secret access.
///
/// Templates are parsed on first use and cached by name for the lifetime of
/// the engine.
pub struct RenderEngine {
    config: Tera,
    secret: Tera,
    sensitive: SensitiveValues,
}

impl RenderEngine {
    /// `secret_targets` maps declared secret names to their mount paths.
    #[must_use]
    pub fn new(secret_targets: BTreeMap<String, String>, resolver: Arc<dyn SecretResolver>) -> Self {
        let secret_targets = Arc::new(secret_targets);
        let sensitive: SensitiveValues = Arc::new(Mutex::new(BTreeSet::new()));

        let mut config = base_root();
        register_secret_path(&mut config, &secret_targets);

        let mut secret = base_root();
        register_secret_path(&mut secret, &secret_targets);
        {
            let resolver = Arc::clone(&resolver);
            let sensitive = Arc::clone(&sensitive);
            secret.register_function("secret", move |args: &HashMap<String, Value>| {
                let path = path_arg("secret", args)?;
                let bytes = resolver.resolve_secret(path).map_err(tera::Error::msg)?;
                let value = String::from_utf8(bytes).map_err(|_| {
                    tera::Error::msg(format!(
                        "secret(path=\"{path}\") is not valid UTF-8; use secretB64"
                    ))
                })?;
                lock_sensitive(&sensitive)?.insert(value.clone());
                Ok(Value::String(value))
            });
        }
        {
            let sensitive = Arc::clone(&sensitive);
            secret.register_function("secretB64", move |args: &HashMap<String, Value>| {
                let path = path_arg("secretB64", args)?;
                let bytes = resolver.resolve_secret(path).map_err(tera::Error::msg)?;
                let encoded = STANDARD.encode(bytes);
                lock_sensitive(&sensitive)?.insert(encoded.clone());
                Ok(Value::String(encoded))
            });
        }

        Self {
            config,
            secret,
            sensitive,
        }
    }

    /// Render a template file, parsing it only the first time its path is seen.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, parsed, or rendered.
    pub fn render_file(
        &mut self,
        capability: Capability,
        path: &Path,
        context: &tera::Context,
    ) -> Result<Vec<u8>, RenderError> {
        let name = path.display().to_string();
        let root = self.root_mut(capability);
        if !root.get_template_names().any(|known| known == name) {
            let source = fs::read_to_string(path).map_err(|source| RenderError::ReadTemplate {
                path: path.to_path_buf(),
                source,
            })?;
            add_template(root, &name, &source)?;
        }
        render(root, &name, context)
    }

    /// Render inline template source cached under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error when the template cannot be parsed or rendered.
    pub fn render_str(
        &mut self,
        capability: Capability,
        name: &str,
        source: &str,
        context: &tera::Context,
    ) -> Result<Vec<u8>, RenderError> {
        let root = self.root_mut(capability);
        if !root.get_template_names().any(|known| known == name) {
            add_template(root, name, source)?;
        }
        render(root, name, context)
    }

    /// Secret values emitted by `secret`/`secretB64` so far.
    #[must_use]
    pub fn sensitive_values(&self) -> BTreeSet<String> {
        self.sensitive
            .lock()
            .map(|values| values.clone())
            .unwrap_or_default()
    }

    fn root_mut(&mut self, capability: Capability) -> &mut Tera {
        match capability {
            Capability::Config => &mut self.config,
            Capability::Secret => &mut self.secret,
        }
    }
}

/// Mount path for a declared secret, or the default location for undeclared names.
#[must_use]
pub fn secret_path(secret_targets: &BTreeMap<String, String>, name: &str) -> String {
    secret_targets
        .get(name)
        .filter(|target| !target.is_empty())
        .cloned()
        .unwrap_or_else(|| format!("{SECRET_MOUNT_DIR}/{name}"))
}

fn add_template(root: &mut Tera, name: &str, source: &str) -> Result<(), RenderError> {
    root.add_raw_template(name, source)
        .map_err(|source| RenderError::Parse {
            name: name.to_string(),
            detail: describe(&source),
            source,
        })
}

fn render(root: &Tera, name: &str, context: &tera::Context) -> Result<Vec<u8>, RenderError> {
    root.render(name, context)
        .map(String::into_bytes)
        .map_err(|source| RenderError::Render {
            name: name.to_string(),
            detail: describe(&source),
            source,
        })
}

/// Tera keeps the useful part of its messages in the source chain.
fn describe(error: &tera::Error) -> String {
    let mut parts = vec![error.to_string()];
    let mut current = error.source();
    while let Some(cause) = current {
        parts.push(cause.to_string());
        current = cause.source();
    }
    parts.join(": ")
}

fn path_arg<'a>(function: &str, args: &'a HashMap<String, Value>) -> tera::Result<&'a str> {
    args.get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg(format!("{function}() requires a `path` string argument")))
}

fn base_root() -> Tera {
    let mut tera = Tera::default();
    tera.autoescape_on(Vec::new());
    // Tera's builtin reads the process environment, which holds store tokens.
    tera.register_function("get_env", |_: &HashMap<String, Value>| -> tera::Result<Value> {
        Err(tera::Error::msg("get_env() is not available in templates"))
    });
    tera.register_filter("b64encode", |value: &Value, _: &HashMap<String, Value>| {
        Ok(Value::String(STANDARD.encode(filter_str("b64encode", value)?)))
    });
    tera.register_filter("b64decode", |value: &Value, _: &HashMap<String, Value>| {
        let decoded = STANDARD
            .decode(filter_str("b64decode", value)?)
            .map_err(|error| tera::Error::msg(format!("b64decode: {error}")))?;
        String::from_utf8(decoded)
            .map(Value::String)
            .map_err(|_| tera::Error::msg("b64decode: decoded value is not valid UTF-8"))
    });
    tera.register_filter("sha256", |value: &Value, _: &HashMap<String, Value>| {
        Ok(Value::String(fingerprint(filter_str("sha256", value)?.as_bytes())))
    });
    tera.register_filter("quote", |value: &Value, _: &HashMap<String, Value>| {
        let text = value.as_str().map_or_else(|| value.to_string(), ToString::to_string);
        Ok(Value::String(format!("\"{}\"", text.replace('"', "\\\""))))
    });
    tera
}

fn filter_str<'a>(filter: &str, value: &'a Value) -> tera::Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| tera::Error::msg(format!("{filter} expects a string")))
}

fn register_secret_path(root: &mut Tera, secret_targets: &Arc<BTreeMap<String, String>>) {
    let secret_targets = Arc::clone(secret_targets);
    root.register_function("secretPath", move |args: &HashMap<String, Value>| {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("secretPath() requires a `name` string argument"))?;
        Ok(Value::String(secret_path(&secret_targets, name)))
    });
}
