// SPDX-FileCopyrightText: 2026 Tome Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text and JSON rendering for command results.

use std::io::IsTerminal;

use colored::Colorize;
use serde::Serialize;
use tome_core::{ExtensionView, SourceView, TomeError};

/// Where and how command results are printed.
pub struct Output {
    json: bool,
    color: bool,
}

impl Output {
    /// Colors are used only for text output to a terminal.
    pub fn new(json: bool, plain: bool) -> Self {
        Self {
            json,
            color: !json && !plain && std::io::stdout().is_terminal(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn color(&self) -> bool {
        self.color
    }

    /// Pretty-print `value` as JSON on stdout.
    pub fn json<T: Serialize>(&self, value: &T) -> Result<(), TomeError> {
        let rendered = serde_json::to_string_pretty(value)
            .map_err(|e| TomeError::Internal(format!("failed to render JSON: {e}")))?;
        println!("{rendered}");
        Ok(())
    }

    /// A one-line success message.
    pub fn success(&self, message: &str) {
        if self.color {
            println!("{} {message}", "✓".green());
        } else {
            println!("[OK] {message}");
        }
    }

    pub fn error(&self, error: &TomeError) {
        if self.json {
            let body = serde_json::json!({
                "error": error.to_string(),
                "status": error.http_status(),
            });
            println!("{body}");
        } else if self.color {
            eprintln!("{} {error}", "error:".red().bold());
        } else {
            eprintln!("error: {error}");
        }
    }
}

/// One line of `tome extensions list`.
pub fn extension_line(view: &ExtensionView, color: bool) -> String {
    let mut flags = Vec::new();
    if view.installed {
        flags.push("installed");
    }
    if view.has_update {
        flags.push("update");
    }
    if view.obsolete {
        flags.push("obsolete");
    }
    if view.is_nsfw {
        flags.push("nsfw");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };

    let line = format!(
        "{:<32} {:<24} {:<10} {:<4}{flags}",
        view.pkg_name, view.name, view.version_name, view.lang
    );
    if !color {
        return line;
    }
    if view.obsolete {
        line.red().to_string()
    } else if view.has_update {
        line.yellow().to_string()
    } else if view.installed {
        line.green().to_string()
    } else {
        line
    }
}

/// One line of `tome sources list`.
pub fn source_line(view: &SourceView) -> String {
    let nsfw = if view.is_nsfw { " [nsfw]" } else { "" };
    format!(
        "{:>20}  {:<32} {}{nsfw}",
        view.id, view.display_name, view.extension_pkg
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> ExtensionView {
        ExtensionView {
            artifact_name: "alpha-v1.4.1.tar.gz".into(),
            icon_url: "/api/v1/extension/icon/alpha-v1.4.1.tar.gz".into(),
            name: "Alpha".into(),
            pkg_name: "alpha".into(),
            version_name: "1.4.1".into(),
            version_code: 1,
            lang: "en".into(),
            is_nsfw: false,
            installed: false,
            has_update: false,
            obsolete: false,
            repository: Some("https://repo.test".into()),
        }
    }

    #[test]
    fn plain_extension_line_has_no_flags_when_not_installed() {
        let line = extension_line(&view(), false);
        assert!(line.starts_with("alpha "));
        assert!(line.contains("1.4.1"));
        assert!(!line.contains('['));
    }

    #[test]
    fn extension_line_lists_flags() {
        let mut v = view();
        v.installed = true;
        v.has_update = true;
        v.obsolete = true;
        let line = extension_line(&v, false);
        assert!(line.ends_with("[installed, update, obsolete]"), "{line}");
    }

    #[test]
    fn source_line_shows_id_and_owner() {
        let source = SourceView {
            id: "4611686018427387904".into(),
            name: "Alpha".into(),
            lang: "en".into(),
            icon_url: String::new(),
            is_nsfw: true,
            display_name: "Alpha (EN)".into(),
            extension_pkg: "alpha".into(),
        };
        let line = source_line(&source);
        assert!(line.contains("4611686018427387904"));
        assert!(line.contains("Alpha (EN)"));
        assert!(line.ends_with("alpha [nsfw]"));
    }

    #[test]
    fn json_output_disables_color() {
        let out = Output::new(true, false);
        assert!(out.is_json());
        assert!(!out.color());
    }
}
