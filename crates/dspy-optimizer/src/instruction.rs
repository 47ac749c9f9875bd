//! Deterministic instruction text generation.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use dspy_types::{FieldSpec, OptimizerError, Signature};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionStyle {
    Concise,
    Detailed,
    #[serde(alias = "step-by-step")]
    StepByStep,
}

impl InstructionStyle {
    pub const ALL: [InstructionStyle; 3] = [Self::Concise, Self::Detailed, Self::StepByStep];

    /// Pick a style by bucketing `seed` into equal slices of `styles`.
    /// An empty slice means every style.
    pub fn from_seed(seed: f64, styles: &[InstructionStyle]) -> InstructionStyle {
        let styles = if styles.is_empty() { &Self::ALL[..] } else { styles };
        styles[bucket(seed, styles.len())]
    }
}

impl FromStr for InstructionStyle {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concise" => Ok(Self::Concise),
            "detailed" => Ok(Self::Detailed),
            "step_by_step" | "step-by-step" => Ok(Self::StepByStep),
            other => Err(OptimizerError::UnsupportedInstructionStyle {
                name: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for InstructionStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Concise => f.write_str("concise"),
            Self::Detailed => f.write_str("detailed"),
            Self::StepByStep => f.write_str("step-by-step"),
        }
    }
}

/// Index of the slice of `[0, 1]` that `seed` falls into.
pub(crate) fn bucket(seed: f64, slices: usize) -> usize {
    if slices == 0 {
        return 0;
    }
    let seed = if seed.is_finite() { seed.clamp(0.0, 1.0) } else { 0.0 };
    ((seed * slices as f64).floor() as usize).min(slices - 1)
}

/// Phrasing variant chosen by the seed, independent of the style bucket.
fn variant(seed: f64, variants: usize) -> usize {
    let seed = if seed.is_finite() { seed.clamp(0.0, 1.0) } else { 0.0 };
    ((seed * 997.0).floor() as usize) % variants.max(1)
}

/// Build the instruction for `signature` in `style`. Identical arguments
/// always produce identical text.
pub fn generate_instruction(signature: &Signature, style: InstructionStyle, seed: f64) -> String {
    match style {
        InstructionStyle::Concise => concise(signature, seed),
        InstructionStyle::Detailed => detailed(signature, seed),
        InstructionStyle::StepByStep => step_by_step(signature, seed),
    }
}

fn field_list(fields: &[FieldSpec], fallback: &str) -> String {
    let names: Vec<String> = fields.iter().map(|f| format!("`{}`", f.name)).collect();
    match names.len() {
        0 => fallback.to_string(),
        1 => names[0].clone(),
        n => format!("{} and {}", names[..n - 1].join(", "), names[n - 1]),
    }
}

fn concise(signature: &Signature, seed: f64) -> String {
    let inputs = field_list(&signature.input_fields, "the inputs");
    let outputs = field_list(&signature.output_fields, "the output");
    match variant(seed, 3) {
        0 => format!("Given {inputs}, produce {outputs}."),
        1 => format!("Use {inputs} to determine {outputs}."),
        _ => format!("Return {outputs} for the provided {inputs}."),
    }
}

fn describe(field: &FieldSpec) -> String {
    match &field.description {
        Some(description) if !description.is_empty() => {
            format!("- {} ({}): {}", field.name, field.field_type, description)
        }
        _ => format!("- {} ({})", field.name, field.field_type),
    }
}

fn detailed(signature: &Signature, seed: f64) -> String {
    let mut lines = Vec::new();
    match variant(seed, 2) {
        0 => lines.push(format!(
            "You are an expert assistant performing the `{}` task.",
            signature.name
        )),
        _ => lines.push(format!("Carefully complete the `{}` task.", signature.name)),
    }
    if !signature.description.is_empty() {
        lines.push(signature.description.clone());
    }

    lines.push("You will receive the following input fields:".to_string());
    lines.extend(signature.input_fields.iter().map(describe));
    lines.push("You must produce the following output fields:".to_string());
    lines.extend(signature.output_fields.iter().map(describe));

    match variant(seed, 2) {
        0 => lines.push(
            "Be thorough: consider every input field and justify each output with the evidence provided."
                .to_string(),
        ),
        _ => lines.push(
            "Give a thorough, complete treatment of every output field and avoid unsupported claims."
                .to_string(),
        ),
    }
    lines.join("\n")
}

fn step_by_step(signature: &Signature, seed: f64) -> String {
    let inputs = field_list(&signature.input_fields, "the inputs");
    let outputs = field_list(&signature.output_fields, "the output");

    let mut steps = vec![
        format!("Read {inputs} carefully."),
        format!("Identify the information needed to produce {outputs}."),
    ];
    match variant(seed, 3) {
        0 => steps.push("Reason through the problem one step at a time.".to_string()),
        1 => steps.push("Break the problem into smaller parts and solve each part.".to_string()),
        _ => {
            steps.push("Work through the problem step by step.".to_string());
            steps.push("Check the intermediate results for mistakes.".to_string());
        }
    }
    steps.push(format!("Write the final {outputs}."));

    let numbered: Vec<String> = steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {}", i + 1, step))
        .collect();
    format!("Follow these steps:\n{}", numbered.join("\n"))
}
