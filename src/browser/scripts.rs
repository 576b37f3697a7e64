//! JavaScript snippets injected into the portal page.

use crate::config::FetchConfig;

/// Registered on every new document so that popups and `target=_blank`
/// links navigate the current tab instead of opening windows the driver
/// does not own.
pub const LINK_HANDLER_SCRIPT: &str = r#"
(function() {
    window.open = function(url) {
        if (url) {
            window.location.href = url;
        }
        return null;
    };

    document.addEventListener('click', function(e) {
        var target = e.target;
        while (target && target.tagName !== 'A') {
            target = target.parentElement;
        }
        if (!target) {
            return;
        }
        var href = target.getAttribute('href');
        var kind = target.getAttribute('target');
        if (href && (kind === '_blank' || kind === '_new')) {
            e.preventDefault();
            window.location.href = href;
        }
    }, true);

    document.addEventListener('DOMContentLoaded', function() {
        var links = document.querySelectorAll('a[target="_blank"], a[target="_new"]');
        for (var i = 0; i < links.length; i++) {
            links[i].removeAttribute('target');
        }
    });
})();
"#;

/// Escape a value for interpolation inside a single- or double-quoted JS
/// string literal.
pub fn escape_js_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Script texts for one portal layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageScripts {
    input_element_id: String,
    cells: String,
    click: String,
}

impl PageScripts {
    pub fn new(config: &FetchConfig) -> Self {
        let cells = match &config.cells_script {
            Some(script) => script.clone(),
            None => Self::cells_script_for(&config.result_row_selector),
        };
        let click = format!(
            "document.getElementById('{}').click();",
            escape_js_string(&config.search_button_id)
        );
        Self {
            input_element_id: escape_js_string(&config.input_element_id),
            cells,
            click,
        }
    }

    /// Script that writes `code` (trimmed) into the input field.
    pub fn input(&self, code: &str) -> String {
        format!(
            "document.getElementById('{}').value='{}';",
            self.input_element_id,
            escape_js_string(code.trim())
        )
    }

    pub fn click(&self) -> &str {
        &self.click
    }

    /// Script returning the first result row as trimmed cell texts, or
    /// `null` while the row does not exist.
    pub fn cells(&self) -> &str {
        &self.cells
    }

    fn cells_script_for(selector: &str) -> String {
        format!(
            r#"(function() {{
    var row = document.querySelector('{}');
    if (!row) return null;
    var texts = [];
    row.querySelectorAll('td').forEach(function(td) {{ texts.push(td.innerText.trim()); }});
    return texts;
}})();"#,
            escape_js_string(selector)
        )
    }
}

/// Inverse of the input script, used by drivers that answer scripts locally.
pub(crate) fn code_from_input_script(script: &str) -> Option<String> {
    let start = script.find(".value='")? + ".value='".len();
    let rest = &script[start..];
    let mut code = String::new();
    let mut chars = rest.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next()? {
                'n' => code.push('\n'),
                'r' => code.push('\r'),
                other => code.push(other),
            },
            '\'' => return Some(code),
            _ => code.push(ch),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_quotes() {
        assert_eq!(escape_js_string("AB'C\"D"), "AB\\'C\\\"D");
        assert_eq!(escape_js_string("a\\b"), "a\\\\b");
        assert_eq!(escape_js_string("plain-123"), "plain-123");
    }

    #[test]
    fn test_input_script_trims_and_escapes() {
        let scripts = PageScripts::new(&FetchConfig::default());
        assert_eq!(
            scripts.input("  X'1  "),
            "document.getElementById('codiceRichiesta').value='X\\'1';"
        );
    }

    #[test]
    fn test_click_script() {
        let scripts = PageScripts::new(&FetchConfig::default());
        assert_eq!(
            scripts.click(),
            "document.getElementById('cercaRichiestaNullaOstaBtn').click();"
        );
    }

    #[test]
    fn test_cells_script_uses_selector() {
        let scripts = PageScripts::new(&FetchConfig::default());
        assert!(scripts
            .cells()
            .contains("document.querySelector('#risultatiConsultazionePratica tbody tr')"));
        assert!(scripts.cells().contains("return null"));
    }

    #[test]
    fn test_custom_cells_script_is_verbatim() {
        let config = FetchConfig {
            cells_script: Some("return [];".to_string()),
            ..Default::default()
        };
        assert_eq!(PageScripts::new(&config).cells(), "return [];");
    }

    #[test]
    fn test_code_from_input_script() {
        let scripts = PageScripts::new(&FetchConfig::default());
        for code in ["A1", "X'1", "q\"uote", "back\\slash"] {
            assert_eq!(
                code_from_input_script(&scripts.input(code)).as_deref(),
                Some(code)
            );
        }
        assert_eq!(code_from_input_script("document.title"), None);
    }
}
