//! Turning a candidate point into a concrete module configuration.

use tracing::debug;

use dspy_types::{Example, Module};

use crate::candidate::Candidate;
use crate::demos::{select_demonstrations, DemoSelectionStrategy};
use crate::instruction::{generate_instruction, InstructionStyle};

/// A derived module and the choices that produced it.
#[derive(Debug, Clone)]
pub struct MaterializedModule {
    pub module: Box<dyn Module>,
    pub style: InstructionStyle,
    pub strategy: DemoSelectionStrategy,
    pub instruction: String,
    pub demo_count: usize,
}

/// Map a `[0, 1]` seed onto the integer seed space of the demo sampler.
pub fn seed_to_u64(seed: f64) -> u64 {
    let seed = if seed.is_finite() { seed.clamp(0.0, 1.0) } else { 0.0 };
    (seed * u32::MAX as f64).round() as u64
}

/// Applies candidates to modules using a fixed set of instruction styles
/// and demo strategies.
#[derive(Debug, Clone, Default)]
pub struct Materializer {
    styles: Vec<InstructionStyle>,
    strategies: Vec<DemoSelectionStrategy>,
}

impl Materializer {
    /// Empty lists mean "every style" and "every strategy".
    pub fn new(styles: Vec<InstructionStyle>, strategies: Vec<DemoSelectionStrategy>) -> Self {
        Self { styles, strategies }
    }

    /// Derive a new module from `module` with the candidate's demos,
    /// instruction and temperature. `module` itself is left untouched.
    pub fn materialize(&self, module: &dyn Module, candidate: &Candidate, trainset: &[Example]) -> MaterializedModule {
        let style = InstructionStyle::from_seed(candidate.instruction_seed(), &self.styles);
        let strategy = DemoSelectionStrategy::from_seed(candidate.demo_seed(), &self.strategies);

        let demos = select_demonstrations(
            module,
            trainset,
            candidate.demo_count(),
            strategy,
            seed_to_u64(candidate.demo_seed()),
        );
        let demo_count = demos.len();
        let instruction = generate_instruction(module.signature(), style, candidate.instruction_seed());

        let derived = module
            .with_demos(demos)
            .with_instruction(&instruction)
            .with_temperature(candidate.temperature());

        debug!(
            candidate = candidate.id(),
            style = %style,
            strategy = %strategy,
            demo_count,
            "Materialized module"
        );

        MaterializedModule {
            module: derived,
            style,
            strategy,
            instruction,
            demo_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{CandidateSource, SearchBounds};
    use dspy_types::{DspyResult, FieldType, Prediction, Signature};

    #[derive(Debug, Clone)]
    struct ConfigurableModule {
        signature: Signature,
        demos: Vec<Example>,
        instruction: Option<String>,
        temperature: f64,
    }

    impl ConfigurableModule {
        fn new() -> Self {
            Self {
                signature: Signature::new("QA")
                    .input("question", FieldType::String)
                    .output("answer", FieldType::String),
                demos: Vec::new(),
                instruction: None,
                temperature: 0.0,
            }
        }
    }

    impl Module for ConfigurableModule {
        fn signature(&self) -> &Signature {
            &self.signature
        }

        fn call(&self, _inputs: &Example) -> DspyResult<Prediction> {
            Ok(Prediction::new().with("temperature", self.temperature))
        }

        fn demos(&self) -> &[Example] {
            &self.demos
        }

        fn instruction(&self) -> Option<&str> {
            self.instruction.as_deref()
        }

        fn with_demos(&self, demos: Vec<Example>) -> Box<dyn Module> {
            Box::new(Self { demos, ..self.clone() })
        }

        fn with_instruction(&self, instruction: &str) -> Box<dyn Module> {
            Box::new(Self {
                instruction: Some(instruction.to_string()),
                ..self.clone()
            })
        }

        fn with_temperature(&self, temperature: f64) -> Box<dyn Module> {
            Box::new(Self { temperature, ..self.clone() })
        }

        fn box_clone(&self) -> Box<dyn Module> {
            Box::new(self.clone())
        }
    }

    fn trainset() -> Vec<Example> {
        (0..6)
            .map(|i| {
                Example::new()
                    .with("question", format!("question number {i}"))
                    .with("answer", i.to_string())
                    .with_inputs(&["question"])
            })
            .collect()
    }

    #[test]
    fn materialize_applies_every_dimension() {
        let original = ConfigurableModule::new();
        let candidate = Candidate::from_point(
            "random_1_0",
            CandidateSource::Random,
            [0.1, 0.5, 0.7, 3.0],
            &SearchBounds::new(4),
        );

        let materialized = Materializer::default().materialize(&original, &candidate, &trainset());

        assert_eq!(materialized.style, InstructionStyle::Concise);
        assert_eq!(materialized.strategy, DemoSelectionStrategy::Diverse);
        assert_eq!(materialized.demo_count, 3);
        assert_eq!(materialized.module.demos().len(), 3);
        assert_eq!(materialized.module.instruction(), Some(materialized.instruction.as_str()));
        let prediction = materialized.module.call(&Example::new()).unwrap();
        assert_eq!(prediction.get_f64("temperature"), Some(0.7));

        assert!(original.demos().is_empty());
        assert!(original.instruction().is_none());
    }

    #[test]
    fn materialize_is_deterministic() {
        let original = ConfigurableModule::new();
        let candidate = Candidate::from_point(
            "guided_2_0",
            CandidateSource::Guided,
            [0.8, 0.2, 0.3, 2.0],
            &SearchBounds::new(4),
        );
        let materializer = Materializer::default();
        let a = materializer.materialize(&original, &candidate, &trainset());
        let b = materializer.materialize(&original, &candidate, &trainset());
        assert_eq!(a.instruction, b.instruction);
        assert_eq!(a.module.demos(), b.module.demos());
    }

    #[test]
    fn restricted_style_list_is_respected() {
        let materializer = Materializer::new(vec![InstructionStyle::StepByStep], vec![DemoSelectionStrategy::Random]);
        let candidate = Candidate::from_point(
            "random_1_1",
            CandidateSource::Random,
            [0.0, 0.9, 0.5, 1.0],
            &SearchBounds::new(4),
        );
        let materialized = materializer.materialize(&ConfigurableModule::new(), &candidate, &trainset());
        assert_eq!(materialized.style, InstructionStyle::StepByStep);
        assert_eq!(materialized.strategy, DemoSelectionStrategy::Random);
        assert!(materialized.instruction.starts_with("Follow these steps"));
    }

    #[test]
    fn seed_mapping_is_monotone_and_bounded() {
        assert_eq!(seed_to_u64(0.0), 0);
        assert_eq!(seed_to_u64(f64::NAN), 0);
        assert_eq!(seed_to_u64(1.0), u32::MAX as u64);
        assert!(seed_to_u64(0.25) < seed_to_u64(0.5));
    }
}
