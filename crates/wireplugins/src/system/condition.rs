use async_trait::async_trait;
use wirecore::{FailureKind, Step, StepInput, StepResult, Value};

/// Compares two resolved values and reports which branch to take.
///
/// Condition nodes are the one kind the executor runs even when a
/// predecessor failed, so a failed branch can still route the flow.
/// A reference to a failed node resolves empty, which `isEmpty` /
/// `notEmpty` are designed to test.
pub struct ConditionStep;

impl ConditionStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConditionStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Step for ConditionStep {
    fn slug(&self) -> &str {
        "condition"
    }

    async fn run(&self, input: StepInput) -> StepResult {
        let operator = input
            .config_text("operator")
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| "equals".to_string());
        let left = input.config.get("left").cloned().unwrap_or(Value::Null);
        let right = input.config.get("right").cloned().unwrap_or(Value::Null);

        let result = match operator.as_str() {
            "equals" => loose_eq(&left, &right),
            "notEquals" => !loose_eq(&left, &right),
            "contains" => left.render().contains(&right.render()),
            "greaterThan" => match numeric_pair(&left, &right) {
                Some((l, r)) => l > r,
                None => return incomparable(&operator, &left, &right),
            },
            "lessThan" => match numeric_pair(&left, &right) {
                Some((l, r)) => l < r,
                None => return incomparable(&operator, &left, &right),
            },
            "isEmpty" => left.render().trim().is_empty(),
            "notEmpty" => !left.render().trim().is_empty(),
            other => {
                return StepResult::fail(
                    FailureKind::Validation,
                    format!("Unknown operator '{}'", other),
                )
            }
        };

        StepResult::success()
            .with_field("result", result)
            .with_field("branch", if result { "true" } else { "false" })
    }
}

/// Numeric comparison when both sides are numbers (or numeric strings),
/// textual comparison otherwise.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match numeric_pair(left, right) {
        Some((l, r)) => l == r,
        None => left.render() == right.render(),
    }
}

fn numeric_pair(left: &Value, right: &Value) -> Option<(f64, f64)> {
    Some((as_number(left)?, as_number(right)?))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn incomparable(operator: &str, left: &Value, right: &Value) -> StepResult {
    StepResult::fail(
        FailureKind::Validation,
        format!(
            "Operator '{}' needs numeric operands, got '{}' and '{}'",
            operator,
            left.render(),
            right.render()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirecore::Fields;

    async fn check(left: Value, operator: &str, right: Value) -> (bool, String) {
        let mut config = Fields::new();
        config.insert("left".to_string(), left);
        config.insert("operator".to_string(), Value::String(operator.to_string()));
        config.insert("right".to_string(), right);

        match ConditionStep::new().run(StepInput::new(config)).await {
            StepResult::Success(fields) => (
                fields["result"] == Value::Bool(true),
                fields["branch"].render(),
            ),
            StepResult::Failure(failure) => panic!("unexpected failure: {}", failure),
        }
    }

    #[tokio::test]
    async fn equals_compares_numbers_loosely() {
        // A template-resolved number may arrive as text
        assert_eq!(
            check(Value::String("5".into()), "equals", Value::Number(5.0)).await,
            (true, "true".to_string())
        );
    }

    #[tokio::test]
    async fn contains_and_empty_checks() {
        assert_eq!(
            check(
                Value::String("buy the dip".into()),
                "contains",
                Value::String("dip".into())
            )
            .await,
            (true, "true".to_string())
        );
        assert_eq!(
            check(Value::String("  ".into()), "isEmpty", Value::Null).await,
            (true, "true".to_string())
        );
        assert_eq!(
            check(Value::String("x".into()), "notEmpty", Value::Null).await,
            (true, "true".to_string())
        );
    }

    #[tokio::test]
    async fn ordering_operators() {
        assert_eq!(
            check(Value::Number(2.0), "greaterThan", Value::Number(1.0)).await,
            (true, "true".to_string())
        );
        assert_eq!(
            check(Value::Number(2.0), "lessThan", Value::Number(1.0)).await,
            (false, "false".to_string())
        );
    }

    #[tokio::test]
    async fn unknown_operator_is_validation_failure() {
        let mut config = Fields::new();
        config.insert("operator".to_string(), Value::String("spaceship".into()));

        match ConditionStep::new().run(StepInput::new(config)).await {
            StepResult::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Validation);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
