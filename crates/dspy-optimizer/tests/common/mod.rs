#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use dspy_optimizer::{Evaluation, Evaluator};
use dspy_types::{internal_error, DspyResult, Example, FieldType, Module, Prediction, Program, Signature};

/// Answers correctly (upper-cases the question) once it has demonstrations.
#[derive(Debug, Clone)]
pub struct PromptModule {
    signature: Signature,
    demos: Vec<Example>,
    instruction: Option<String>,
    temperature: f64,
    tracing: bool,
}

impl PromptModule {
    pub fn new() -> Self {
        Self {
            signature: Signature::new("Shout")
                .with_description("Repeat the question in capitals.")
                .input("question", FieldType::String)
                .output("answer", FieldType::String),
            demos: Vec::new(),
            instruction: None,
            temperature: 0.0,
            tracing: false,
        }
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }
}

impl Module for PromptModule {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, inputs: &Example) -> DspyResult<Prediction> {
        let answer = if self.demos.is_empty() {
            "unknown".to_string()
        } else {
            inputs.get_str("question").unwrap_or_default().to_uppercase()
        };
        Ok(Prediction::new().with("answer", answer).with("confidence", 1.0 - self.temperature))
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

    fn enable_trace(&mut self) {
        self.tracing = true;
    }

    fn disable_trace(&mut self) {
        self.tracing = false;
    }

    fn is_tracing(&self) -> bool {
        self.tracing
    }
}

pub fn trainset(n: usize) -> Vec<Example> {
    (0..n)
        .map(|i| {
            let question = format!("word number {i}");
            Example::new()
                .with("question", question.as_str())
                .with("answer", question.to_uppercase())
                .with_inputs(&["question"])
        })
        .collect()
}

pub fn scores(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(name, score)| (name.to_string(), *score)).collect()
}

/// Replays a fixed script of results, cycling when it runs out. `None`
/// entries fail.
pub struct ScriptedEvaluator {
    script: Vec<Option<BTreeMap<String, f64>>>,
    calls: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new(script: Vec<Option<BTreeMap<String, f64>>>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn constant(name: &str, score: f64) -> Self {
        Self::new(vec![Some(scores(&[(name, score)]))])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Evaluator for ScriptedEvaluator {
    fn evaluate(&self, _program: &dyn Program, _valset: &[Example]) -> DspyResult<Evaluation> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script[call % self.script.len()] {
            Some(scores) => Ok(Evaluation {
                scores: scores.clone(),
                traces: Vec::new(),
            }),
            None => Err(internal_error!("scripted failure on call {}", call)),
        }
    }
}
