use std::fmt::Write;
use std::io::{self, IsTerminal};

use console::Style;
use swarmcp_domain::{
    ApplyAction, ApplyReport, ApplyStepResult, ConfigPayload, EffectiveProject, EffectiveService,
    LABEL_FINGERPRINT, MountReference, ObjectKind, Plan, ServiceApply, short_fingerprint,
};

mod error;
mod options;
mod redaction;

pub use error::ReportError;
pub use options::{ColorChoice, OutputFormat, RenderOptions};
pub use redaction::redact_sensitive;

/// Render a plan in the requested output format.
///
/// Secret payload data is never part of the output.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_plan(
    plan: &Plan,
    format: OutputFormat,
    options: &RenderOptions,
) -> Result<String, ReportError> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(plan)
            .map_err(|source| ReportError::JsonSerialize { document: "plan", source }),
        OutputFormat::Text => Ok(render_plan_text(plan, options)),
    }
}

/// Render an apply report in the requested output format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_apply(
    report: &ApplyReport,
    format: OutputFormat,
    options: &RenderOptions,
) -> Result<String, ReportError> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(report).map_err(|source| {
            ReportError::JsonSerialize {
                document: "apply report",
                source,
            }
        }),
        OutputFormat::Text => Ok(render_apply_text(report, options)),
    }
}

/// Render resolved state: rendered config contents, and file targets for
/// secrets (whose values are never shown).
#[must_use]
pub fn render_effective(project: &EffectiveProject, options: &RenderOptions) -> String {
    let mut output = String::new();
    let style = TextStyle::new(options.color);
    append_header(&mut output, "render", options.target.as_deref(), &style);

    if project.stacks.is_empty() {
        let _ = writeln!(output, "  Nothing to render.");
        return output;
    }

    for stack in &project.stacks {
        let _ = writeln!(output);
        let instance = stack
            .instance_name()
            .map_or_else(String::new, |name| format!(" {}", style.dim(&format!("instance {name}"))));
        let _ = writeln!(
            output,
            "{} {}{instance}",
            style.header_command("stack"),
            style.primary_text(&stack.name)
        );
        for service in &stack.services {
            append_effective_service(&mut output, service, options, &style);
        }
    }
    output
}

// ---------------------------------------------------------------------------
// Plan text
// ---------------------------------------------------------------------------

fn render_plan_text(plan: &Plan, options: &RenderOptions) -> String {
    let mut output = String::new();
    let style = TextStyle::new(options.color);
    append_header(&mut output, "plan", options.target.as_deref(), &style);

    if plan.object_count() == 0 {
        let _ = writeln!(output, "  Nothing to do.");
        return output;
    }

    let _ = writeln!(output);
    for network in &plan.networks {
        let internal = if network.internal { " internal" } else { "" };
        let detail = style.dim(&format!("{}{internal}", network.driver));
        append_object_line(&mut output, &style.add_symbol("+"), &style.add_label("network"), &network.name, &detail);
    }
    for config in &plan.configs {
        append_plan_config(&mut output, config, options, &style);
    }
    for secret in &plan.secrets {
        let detail = style.dim(&format!("from {}", secret.declared_name));
        append_object_line(&mut output, &style.add_symbol("+"), &style.add_label("secret"), &secret.name, &detail);
    }
    for service in &plan.services {
        append_plan_service(&mut output, service, options, &style);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "{}", PlanTally::from_plan(plan).format(&style));
    output
}

fn append_plan_config(
    output: &mut String,
    config: &ConfigPayload,
    options: &RenderOptions,
    style: &TextStyle,
) {
    match &config.data {
        Some(data) => {
            let detail = style.dim(&format!("from {}", config.declared_name));
            append_object_line(output, &style.add_symbol("+"), &style.add_label("config"), &config.name, &detail);
            if options.verbose {
                let _ = writeln!(output, "    {}", style.dim(&format!("{} bytes", data.len())));
            }
        }
        None => {
            let detail = style.dim("external");
            append_object_line(output, &style.noop_symbol("="), &style.noop_label("config"), &config.name, &detail);
        }
    }
}

fn append_plan_service(
    output: &mut String,
    service: &ServiceApply,
    options: &RenderOptions,
    style: &TextStyle,
) {
    let detail = style.dim(&format!("{} x{}", service.spec.image, service.spec.replicas));
    append_object_line(output, &style.change_symbol("~"), &style.change_label("service"), &service.name, &detail);
    if !options.verbose {
        return;
    }
    if let Some(fingerprint) = service.labels.get(LABEL_FINGERPRINT) {
        let _ = writeln!(
            output,
            "    {}",
            style.dim(&format!("fingerprint: sha256:{}", short_fingerprint(fingerprint)))
        );
    }
    if !service.spec.networks.is_empty() {
        let _ = writeln!(
            output,
            "    {}",
            style.dim(&format!("networks: {}", service.spec.networks.join(", ")))
        );
    }
    for mount in service.spec.configs.iter().chain(&service.spec.secrets) {
        let _ = writeln!(output, "    {}", style.dim(&format_mount(mount)));
    }
}

fn format_mount(mount: &MountReference) -> String {
    format!(
        "{} -> {} ({}:{} {:04o})",
        mount.source, mount.target, mount.uid, mount.gid, mount.mode
    )
}

// ---------------------------------------------------------------------------
// Apply text
// ---------------------------------------------------------------------------

fn render_apply_text(report: &ApplyReport, options: &RenderOptions) -> String {
    let mut output = String::new();
    let style = TextStyle::new(options.color);
    append_header(&mut output, "apply", options.target.as_deref(), &style);

    if report.results.is_empty() {
        let _ = writeln!(output, "  Nothing to do.");
        append_errors(&mut output, &report.errors, &style);
        return output;
    }

    let (active, unchanged): (Vec<&ApplyStepResult>, Vec<&ApplyStepResult>) = report
        .results
        .iter()
        .partition(|result| result.changed || !result.success);

    let _ = writeln!(output);
    append_errors(&mut output, &report.errors, &style);
    for result in &active {
        append_apply_line(&mut output, result, &style);
    }

    if options.verbose {
        for result in &unchanged {
            append_apply_line(&mut output, result, &style);
        }
    } else if !unchanged.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "  {}",
            style.dim(&format!("{} unchanged", unchanged.len()))
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "{}", ApplyTally::from_results(&report.results).format(&style));
    output
}

fn append_apply_line(output: &mut String, result: &ApplyStepResult, style: &TextStyle) {
    let kind = result.kind.to_string();
    let (symbol, label) = if !result.success {
        (style.error_symbol("!"), style.error_label(&format!("failed {kind}")))
    } else if !result.changed {
        (style.noop_symbol("="), style.noop_label(&kind))
    } else {
        match result.action {
            ApplyAction::Create | ApplyAction::Ensure => {
                (style.add_symbol("+"), style.add_label(&format!("created {kind}")))
            }
            ApplyAction::Update => {
                (style.change_symbol("~"), style.change_label(&format!("updated {kind}")))
            }
            ApplyAction::Prune => {
                (style.remove_symbol("-"), style.remove_label(&format!("pruned {kind}")))
            }
        }
    };
    let detail = result
        .id
        .as_deref()
        .map_or_else(String::new, |id| style.dim(&format!("id {id}")));
    append_object_line(output, &symbol, &label, &result.name, &detail);

    if let Some(error) = result.error.as_deref().filter(|_| !result.success) {
        let _ = writeln!(output, "    {} {error}", style.error_prefix("error:"));
    }
}

// ---------------------------------------------------------------------------
// Effective state text
// ---------------------------------------------------------------------------

fn append_effective_service(
    output: &mut String,
    service: &EffectiveService,
    options: &RenderOptions,
    style: &TextStyle,
) {
    let _ = writeln!(
        output,
        "  {} {} {}",
        style.change_label("service"),
        style.primary_text(&service.name),
        style.dim(&service.spec.image.to_string())
    );
    for entry in service.env_decl() {
        let _ = writeln!(output, "    {} {entry}", style.dim("env"));
    }
    for network in &service.networks {
        let _ = writeln!(output, "    {} {network}", style.dim("network"));
    }

    for config in &service.configs {
        let file = &config.file;
        let target = format!("{} ({}:{} {:04o})", file.target, file.uid, file.gid, file.mode);
        match &config.data {
            Some(data) => {
                let _ = writeln!(
                    output,
                    "    {} {} {} {}",
                    style.add_label("config"),
                    config.name,
                    style.dim("->"),
                    target
                );
                for line in String::from_utf8_lossy(data).lines() {
                    let _ = writeln!(output, "      {} {line}", style.dim("|"));
                }
            }
            None => {
                let _ = writeln!(
                    output,
                    "    {} {} {} {} {}",
                    style.noop_label("config"),
                    config.name,
                    style.dim("->"),
                    target,
                    style.dim("external")
                );
            }
        }
    }

    for secret in &service.secrets {
        let file = &secret.file;
        let size = if options.verbose {
            format!(" {}", style.dim(&format!("{} bytes", secret.data.len())))
        } else {
            String::new()
        };
        let _ = writeln!(
            output,
            "    {} {} {} {} ({}:{} {:04o}){size}",
            style.warn_prefix("secret"),
            secret.name,
            style.dim("->"),
            file.target,
            file.uid,
            file.gid,
            file.mode
        );
    }
}

// ---------------------------------------------------------------------------
// Shared line renderers
// ---------------------------------------------------------------------------

fn append_header(output: &mut String, command: &str, target: Option<&str>, style: &TextStyle) {
    let _ = write!(output, "{}", style.header_command(command));
    if let Some(target) = target {
        let _ = write!(output, " {}", style.header_target(target));
    }
    let _ = writeln!(output);
}

fn append_object_line(output: &mut String, symbol: &str, label: &str, name: &str, detail: &str) {
    let label = TextStyle::pad_label(label);
    if detail.is_empty() {
        let _ = writeln!(output, "  {symbol} {label}{name}");
    } else {
        let _ = writeln!(output, "  {symbol} {label}{name} {detail}");
    }
}

fn append_errors(output: &mut String, errors: &[String], style: &TextStyle) {
    if errors.is_empty() {
        return;
    }
    let _ = writeln!(output);
    for error in errors {
        let _ = writeln!(output, "  {} {error}", style.error_prefix("error:"));
    }
}

// ---------------------------------------------------------------------------
// Tallies
// ---------------------------------------------------------------------------

struct PlanTally {
    networks: usize,
    configs: usize,
    external: usize,
    secrets: usize,
    services: usize,
}

impl PlanTally {
    fn from_plan(plan: &Plan) -> Self {
        let external = plan.configs.iter().filter(|config| config.data.is_none()).count();
        Self {
            networks: plan.networks.len(),
            configs: plan.configs.len() - external,
            external,
            secrets: plan.secrets.len(),
            services: plan.services.len(),
        }
    }

    fn format(&self, style: &TextStyle) -> String {
        let counts = [
            (self.networks, ObjectKind::Network.to_string()),
            (self.configs, ObjectKind::Config.to_string()),
            (self.secrets, ObjectKind::Secret.to_string()),
            (self.services, ObjectKind::Service.to_string()),
        ];
        let mut parts: Vec<String> = counts
            .iter()
            .filter(|(count, _)| *count > 0)
            .map(|(count, noun)| style.add_label(&plural(*count, noun)))
            .collect();
        if self.external > 0 {
            parts.push(style.dim(&format!("{} external", plural(self.external, "config"))));
        }
        format!("{} {}", style.tally_label("Plan:"), parts.join(", "))
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

struct ApplyTally {
    created: usize,
    updated: usize,
    pruned: usize,
    failed: usize,
    unchanged: usize,
}

impl ApplyTally {
    fn from_results(results: &[ApplyStepResult]) -> Self {
        let mut tally = Self {
            created: 0,
            updated: 0,
            pruned: 0,
            failed: 0,
            unchanged: 0,
        };
        for result in results {
            if !result.success {
                tally.failed += 1;
            } else if !result.changed {
                tally.unchanged += 1;
            } else {
                match result.action {
                    ApplyAction::Create | ApplyAction::Ensure => tally.created += 1,
                    ApplyAction::Update => tally.updated += 1,
                    ApplyAction::Prune => tally.pruned += 1,
                }
            }
        }
        tally
    }

    fn format(&self, style: &TextStyle) -> String {
        let mut parts = Vec::new();
        if self.created > 0 {
            parts.push(style.add_label(&format!("{} created", self.created)));
        }
        if self.updated > 0 {
            parts.push(style.change_label(&format!("{} updated", self.updated)));
        }
        if self.pruned > 0 {
            parts.push(style.remove_label(&format!("{} pruned", self.pruned)));
        }
        if self.failed > 0 {
            parts.push(style.error_label(&format!("{} failed", self.failed)));
        }
        if self.unchanged > 0 {
            parts.push(style.dim(&format!("{} unchanged", self.unchanged)));
        }
        if parts.is_empty() {
            format!("{} nothing to do", style.tally_label("Applied:"))
        } else {
            format!("{} {}", style.tally_label("Applied:"), parts.join(", "))
        }
    }
}

// ---------------------------------------------------------------------------
// TextStyle
// ---------------------------------------------------------------------------

const LABEL_WIDTH: usize = 16;

#[derive(Debug, Clone)]
struct TextStyle {
    color_enabled: bool,
    add: Style,
    change: Style,
    remove: Style,
    error: Style,
    noop: Style,
    primary: Style,
    dim: Style,
    header_command: Style,
    header_target: Style,
    warn_prefix: Style,
    error_prefix: Style,
    tally_label: Style,
}

impl TextStyle {
    fn new(choice: ColorChoice) -> Self {
        Self {
            color_enabled: should_color(choice),
            add: Style::new().green(),
            change: Style::new().cyan(),
            remove: Style::new().magenta(),
            error: Style::new().red(),
            noop: Style::new().dim(),
            primary: Style::new().white(),
            dim: Style::new().dim(),
            header_command: Style::new().white().bold(),
            header_target: Style::new().dim(),
            warn_prefix: Style::new().yellow().bold(),
            error_prefix: Style::new().red().bold(),
            tally_label: Style::new().white().bold(),
        }
    }

    fn paint(&self, style: &Style, text: &str) -> String {
        if self.color_enabled {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn pad_label(painted: &str) -> String {
        let visible_len = console::measure_text_width(painted);
        if visible_len < LABEL_WIDTH {
            format!("{painted}{}", " ".repeat(LABEL_WIDTH - visible_len))
        } else {
            format!("{painted} ")
        }
    }

    fn add_symbol(&self, text: &str) -> String {
        self.paint(&self.add.clone().bold(), text)
    }
    fn change_symbol(&self, text: &str) -> String {
        self.paint(&self.change.clone().bold(), text)
    }
    fn remove_symbol(&self, text: &str) -> String {
        self.paint(&self.remove.clone().bold(), text)
    }
    fn error_symbol(&self, text: &str) -> String {
        self.paint(&self.error.clone().bold(), text)
    }
    fn noop_symbol(&self, text: &str) -> String {
        self.paint(&self.noop, text)
    }

    fn add_label(&self, text: &str) -> String {
        self.paint(&self.add, text)
    }
    fn change_label(&self, text: &str) -> String {
        self.paint(&self.change, text)
    }
    fn remove_label(&self, text: &str) -> String {
        self.paint(&self.remove, text)
    }
    fn error_label(&self, text: &str) -> String {
        self.paint(&self.error, text)
    }
    fn noop_label(&self, text: &str) -> String {
        self.paint(&self.noop, text)
    }

    fn primary_text(&self, text: &str) -> String {
        self.paint(&self.primary, text)
    }
    fn dim(&self, text: &str) -> String {
        self.paint(&self.dim, text)
    }

    fn header_command(&self, text: &str) -> String {
        self.paint(&self.header_command, text)
    }
    fn header_target(&self, text: &str) -> String {
        self.paint(&self.header_target, text)
    }

    fn warn_prefix(&self, text: &str) -> String {
        self.paint(&self.warn_prefix, text)
    }
    fn error_prefix(&self, text: &str) -> String {
        self.paint(&self.error_prefix, text)
    }

    fn tally_label(&self, text: &str) -> String {
        self.paint(&self.tally_label, text)
    }
}

fn should_color(choice: ColorChoice) -> bool {
    match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => io::stdout().is_terminal(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
