//! Static evaluation of step conditionals.
//!
//! Step `if:` expressions may reference a per-repository template context.
//! When every referenced value is known before execution, the conditional
//! can be decided statically and the step included or dropped up front.
//! Expressions referencing runtime-only namespaces (step outputs,
//! previous-step state) are left for dynamic evaluation at run time.

use regex::Regex;

/// Attributes of the batch change available to templates.
#[derive(Debug, Clone, Default)]
pub struct BatchChangeAttributes {
    pub name: String,
    pub description: String,
}

/// The per-repository slice of the template context.
#[derive(Debug, Clone, Default)]
pub struct RepositoryContext {
    pub name: String,
    pub file_matches: Vec<String>,
}

/// Template context for statically evaluating one step conditional.
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    pub repository: RepositoryContext,
    pub batch_change: BatchChangeAttributes,
}

impl StepContext {
    /// Resolve a single `${{ ... }}` expression, or `None` when the
    /// expression references a value only known at run time.
    fn resolve_expression(&self, expr: &str) -> Option<String> {
        match expr {
            "repository.name" => Some(self.repository.name.clone()),
            "repository.file_matches" => Some(self.repository.file_matches.join(" ")),
            "batch_change.name" => Some(self.batch_change.name.clone()),
            "batch_change.description" => Some(self.batch_change.description.clone()),
            _ => None,
        }
    }
}

/// Statically evaluate a step conditional against the context.
///
/// Returns `Some(b)` when the expression is statically decidable and
/// evaluates to `b`, and `None` when it must be evaluated dynamically.
/// Callers treat an empty conditional as "always included" before calling
/// this.
pub fn is_static_bool(expr: &str, ctx: &StepContext) -> Option<bool> {
    let re = Regex::new(r"\$\{\{\s*([^}]+?)\s*\}\}").unwrap();

    let mut dynamic = false;
    let interpolated = re.replace_all(expr, |caps: &regex::Captures| {
        let inner = caps.get(1).map_or("", |m| m.as_str()).trim();
        match ctx.resolve_expression(inner) {
            Some(value) => value,
            None => {
                dynamic = true;
                String::new()
            }
        }
    });
    if dynamic {
        return None;
    }

    evaluate_string_expression(interpolated.trim())
}

/// Evaluate a fully interpolated expression: boolean literals, equality,
/// inequality and substring containment. Unrecognized forms are not
/// statically decidable.
fn evaluate_string_expression(expr: &str) -> Option<bool> {
    if expr == "true" {
        return Some(true);
    }
    if expr == "false" {
        return Some(false);
    }

    if let Some((left, right)) = expr.split_once("==") {
        return Some(left.trim() == right.trim());
    }
    if let Some((left, right)) = expr.split_once("!=") {
        return Some(left.trim() != right.trim());
    }
    if let Some((left, right)) = expr.split_once(" contains ") {
        return Some(left.trim().contains(right.trim()));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> StepContext {
        StepContext {
            repository: RepositoryContext {
                name: "github.com/foo/bar".into(),
                file_matches: vec!["go.mod".into(), "modules/x/go.mod".into()],
            },
            batch_change: BatchChangeAttributes {
                name: "upgrade-go".into(),
                description: "bump everything".into(),
            },
        }
    }

    #[test]
    fn test_boolean_literals() {
        assert_eq!(is_static_bool("true", &ctx()), Some(true));
        assert_eq!(is_static_bool("false", &ctx()), Some(false));
    }

    #[test]
    fn test_repository_name_equality() {
        assert_eq!(
            is_static_bool("${{ repository.name }} == github.com/foo/bar", &ctx()),
            Some(true)
        );
        assert_eq!(
            is_static_bool("${{ repository.name }} == github.com/foo/baz", &ctx()),
            Some(false)
        );
    }

    #[test]
    fn test_inequality_and_contains() {
        assert_eq!(
            is_static_bool("${{ batch_change.name }} != upgrade-go", &ctx()),
            Some(false)
        );
        assert_eq!(
            is_static_bool("${{ repository.file_matches }} contains modules/x", &ctx()),
            Some(true)
        );
    }

    #[test]
    fn test_runtime_namespace_is_dynamic() {
        assert_eq!(is_static_bool("${{ outputs.changed }} == true", &ctx()), None);
        assert_eq!(is_static_bool("${{ steps.build.exit_code }} == 0", &ctx()), None);
        assert_eq!(is_static_bool("${{ previous_step.stdout }} != ", &ctx()), None);
    }

    #[test]
    fn test_unrecognized_form_is_dynamic() {
        assert_eq!(is_static_bool("${{ repository.name }}", &ctx()), None);
    }
}
