//! Module and program contracts consumed by the optimizer.
//!
//! A [`Module`] is a single LLM-backed step with a [`Signature`]. Deriving a
//! configured variant (`with_demos`, `with_instruction`, `with_temperature`)
//! always returns a new instance and leaves the receiver untouched. A
//! [`Program`] is a named collection of modules that can be deep-copied with
//! `Clone` and rewritten module by module.

use crate::errors::{DspyResult, ProgramError};
use crate::example::{Example, Prediction};
use crate::signature::Signature;

/// A single callable step of a program.
pub trait Module: Send + Sync {
    fn signature(&self) -> &Signature;

    /// Run the module on the given inputs.
    fn call(&self, inputs: &Example) -> DspyResult<Prediction>;

    /// Demonstrations currently attached to the module.
    fn demos(&self) -> &[Example];

    fn instruction(&self) -> Option<&str> {
        None
    }

    /// New instance configured with `demos`; the receiver is unchanged.
    fn with_demos(&self, demos: Vec<Example>) -> Box<dyn Module>;

    /// New instance configured with `instruction`; the receiver is unchanged.
    fn with_instruction(&self, instruction: &str) -> Box<dyn Module>;

    /// New instance sampling at `temperature`. Modules without a sampling
    /// knob return an unchanged copy.
    fn with_temperature(&self, _temperature: f64) -> Box<dyn Module> {
        self.box_clone()
    }

    fn box_clone(&self) -> Box<dyn Module>;

    fn enable_trace(&mut self) {}

    fn disable_trace(&mut self) {}

    fn is_tracing(&self) -> bool {
        false
    }
}

impl Clone for Box<dyn Module> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

impl std::fmt::Debug for dyn Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("signature", &self.signature().name)
            .field("demos", &self.demos().len())
            .field("instruction", &self.instruction())
            .field("tracing", &self.is_tracing())
            .finish()
    }
}

/// A composition of named modules.
pub trait Program: Send + Sync {
    /// Names of the constituent modules, in execution order.
    fn module_names(&self) -> DspyResult<Vec<String>>;

    fn module(&self, name: &str) -> Option<&dyn Module>;

    fn module_mut(&mut self, name: &str) -> Option<&mut dyn Module>;

    /// Substitute the module registered under `name`, returning the instance
    /// it replaced.
    fn replace_module(&mut self, name: &str, module: Box<dyn Module>) -> DspyResult<Box<dyn Module>>;

    fn forward(&self, inputs: &Example) -> DspyResult<Prediction>;
}

/// Program made of exactly one module, used to optimize a module on its own.
#[derive(Debug, Clone)]
pub struct SingleModuleProgram {
    name: String,
    module: Box<dyn Module>,
}

impl SingleModuleProgram {
    pub const MODULE_NAME: &'static str = "module";

    pub fn new(module: Box<dyn Module>) -> Self {
        Self {
            name: Self::MODULE_NAME.to_string(),
            module,
        }
    }

    pub fn inner(&self) -> &dyn Module {
        self.module.as_ref()
    }

    pub fn into_module(self) -> Box<dyn Module> {
        self.module
    }
}

impl Program for SingleModuleProgram {
    fn module_names(&self) -> DspyResult<Vec<String>> {
        Ok(vec![self.name.clone()])
    }

    fn module(&self, name: &str) -> Option<&dyn Module> {
        if name == self.name {
            Some(self.module.as_ref())
        } else {
            None
        }
    }

    fn module_mut(&mut self, name: &str) -> Option<&mut dyn Module> {
        if name == self.name {
            Some(self.module.as_mut())
        } else {
            None
        }
    }

    fn replace_module(&mut self, name: &str, module: Box<dyn Module>) -> DspyResult<Box<dyn Module>> {
        if name != self.name {
            return Err(ProgramError::ModuleNotFound { name: name.to_string() }.into());
        }
        Ok(std::mem::replace(&mut self.module, module))
    }

    fn forward(&self, inputs: &Example) -> DspyResult<Prediction> {
        self.module.call(inputs)
    }
}

/// Program that runs its modules in order, feeding each module the original
/// inputs merged with every earlier module's outputs.
#[derive(Debug, Clone, Default)]
pub struct SequentialProgram {
    stages: Vec<(String, Box<dyn Module>)>,
}

impl SequentialProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, name: impl Into<String>, module: Box<dyn Module>) -> Self {
        self.stages.push((name.into(), module));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Program for SequentialProgram {
    fn module_names(&self) -> DspyResult<Vec<String>> {
        Ok(self.stages.iter().map(|(name, _)| name.clone()).collect())
    }

    fn module(&self, name: &str) -> Option<&dyn Module> {
        self.stages
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, m)| m.as_ref())
    }

    fn module_mut(&mut self, name: &str) -> Option<&mut dyn Module> {
        match self.stages.iter_mut().find(|(n, _)| n == name) {
            Some((_, module)) => Some(module.as_mut()),
            None => None,
        }
    }

    fn replace_module(&mut self, name: &str, module: Box<dyn Module>) -> DspyResult<Box<dyn Module>> {
        let slot = self
            .stages
            .iter_mut()
            .find(|(n, _)| n == name)
            .ok_or_else(|| ProgramError::ModuleNotFound { name: name.to_string() })?;
        Ok(std::mem::replace(&mut slot.1, module))
    }

    fn forward(&self, inputs: &Example) -> DspyResult<Prediction> {
        if self.stages.is_empty() {
            return Err(ProgramError::NoModules.into());
        }

        let mut context = inputs.clone();
        let mut last = Prediction::new();
        for (_, module) in &self.stages {
            last = module.call(&context)?;
            for (key, value) in last.fields() {
                context.set(key.clone(), value.clone());
            }
            let keys: Vec<String> = context.keys().map(str::to_string).collect();
            context = context.with_inputs(&keys);
        }
        Ok(last)
    }
}
