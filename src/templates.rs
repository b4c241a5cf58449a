use anyhow::Result;
use regex::Regex;
use tera::{Context, Tera};

use crate::scaffold::Archetype;

/// Marker substituted for any placeholder the renderer could not resolve.
pub const UNRESOLVED_MARKER: &str = "TODO: customize this";

/// Thin wrapper around Tera so the classification logic never touches the
/// template syntax directly; a future engine swap stays local to this file.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();

        tera.add_raw_templates(vec![
            ("manager.test.sh", MANAGER_TEMPLATE),
            ("provider.test.sh", PROVIDER_TEMPLATE),
            ("core.test.sh", CORE_TEMPLATE),
            ("utility.test.sh", UTILITY_TEMPLATE),
        ])?;

        Ok(Self { tera })
    }

    pub fn render(&self, archetype: Archetype, context: &Context) -> Result<String> {
        let template = match archetype {
            Archetype::Manager => "manager.test.sh",
            Archetype::Provider => "provider.test.sh",
            Archetype::Core => "core.test.sh",
            Archetype::Utility => "utility.test.sh",
        };

        let rendered = self.tera.render(template, context)?;
        Ok(scrub_unresolved(&rendered))
    }
}

/// Replace any placeholder token that survived rendering. Raw tokens
/// must never leak into a generated test file.
fn scrub_unresolved(rendered: &str) -> String {
    let pattern = Regex::new(r"\{\{[^}]*\}\}").expect("placeholder pattern is valid");
    pattern.replace_all(rendered, UNRESOLVED_MARKER).to_string()
}

// Template constants. All of these render through `stest`, the external
// unit-test runner, which sources the file and runs every test_* function.

const MANAGER_TEMPLATE: &str = r#"#!/usr/bin/env stest
# Auto-generated tests for {{ module_name }} v{{ version }}
# {{ description }}
# Archetype: Manager

setup() {
  source "${MODULE_ROOT}/{{ module_name }}/{{ module_name }}.sh"
}

test_module_loads() {
  assert_success
}
{% for unit in exports %}
test_{{ unit }}_is_defined() {
  assert_function "{{ unit }}"
}
{% endfor %}
test_{{ resource }}_lifecycle() {
  # Exercise create/update/remove of a throwaway {{ resource }}.
  {{ todo }}
}

test_{{ resource }}_rejects_invalid_input() {
  {{ todo }}
}

EXPORTS={{ exports_literal }}

test_all_exports_are_functions() {
  for unit in "${EXPORTS[@]}"; do
    assert_function "${unit}"
  done
}
"#;

const PROVIDER_TEMPLATE: &str = r#"#!/usr/bin/env stest
# Auto-generated tests for {{ module_name }} v{{ version }}
# {{ description }}
# Archetype: Provider

setup() {
  source "${MODULE_ROOT}/{{ module_name }}/{{ module_name }}.sh"
}

test_module_loads() {
  assert_success
}
{% for unit in exports %}
test_{{ unit }}_is_defined() {
  assert_function "{{ unit }}"
}
{% endfor %}
test_{{ subject }}_query_returns_data() {
  # Providers must answer an empty query without erroring.
  {{ todo }}
}

test_{{ subject }}_query_is_read_only() {
  {{ todo }}
}

EXPORTS={{ exports_literal }}
"#;

const CORE_TEMPLATE: &str = r#"#!/usr/bin/env stest
# Auto-generated tests for {{ module_name }} v{{ version }}
# {{ description }}
# Archetype: Core

setup() {
  source "${MODULE_ROOT}/{{ module_name }}/{{ module_name }}.sh"
}

test_module_loads() {
  assert_success
}

test_module_loads_twice_without_side_effects() {
  source "${MODULE_ROOT}/{{ module_name }}/{{ module_name }}.sh"
  assert_success
}
{% for unit in exports %}
test_{{ unit }}_is_defined() {
  assert_function "{{ unit }}"
}
{% endfor %}
EXPORTS={{ exports_literal }}
"#;

const UTILITY_TEMPLATE: &str = r#"#!/usr/bin/env stest
# Auto-generated tests for {{ module_name }} v{{ version }}
# {{ description }}
# Archetype: Utility

setup() {
  source "${MODULE_ROOT}/{{ module_name }}/{{ module_name }}.sh"
}

test_module_loads() {
  assert_success
}
{% for unit in exports %}
test_{{ unit }}_behaves() {
  assert_function "{{ unit }}"
  # {{ todo }}
}
{% endfor %}
EXPORTS={{ exports_literal }}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Context {
        let mut context = Context::new();
        context.insert("module_name", "alpha_manager");
        context.insert("version", "1.0.0");
        context.insert("description", "Manages alphas");
        context.insert("exports", &vec!["create_alpha", "remove_alpha"]);
        context.insert("exports_literal", "(\"create_alpha\" \"remove_alpha\")");
        context.insert("resource", "alpha");
        context.insert("subject", "alpha");
        context.insert("todo", UNRESOLVED_MARKER);
        context
    }

    #[test]
    fn renders_each_archetype() {
        let engine = TemplateEngine::new().unwrap();
        for archetype in [
            Archetype::Manager,
            Archetype::Provider,
            Archetype::Core,
            Archetype::Utility,
        ] {
            let rendered = engine.render(archetype, &context()).unwrap();
            assert!(rendered.contains("alpha_manager"));
            assert!(!rendered.contains("{{"), "{archetype:?} leaked a token");
        }
    }

    #[test]
    fn manager_template_covers_lifecycle_and_exports() {
        let engine = TemplateEngine::new().unwrap();
        let rendered = engine.render(Archetype::Manager, &context()).unwrap();
        assert!(rendered.contains("test_alpha_lifecycle"));
        assert!(rendered.contains("test_create_alpha_is_defined"));
        assert!(rendered.contains("EXPORTS=(\"create_alpha\" \"remove_alpha\")"));
    }

    #[test]
    fn scrub_replaces_surviving_tokens() {
        let scrubbed = scrub_unresolved("echo {{ mystery_value }}");
        assert_eq!(scrubbed, format!("echo {}", UNRESOLVED_MARKER));
    }
}
