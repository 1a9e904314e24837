// SPDX-License-Identifier: GPL-3.0-only

//! Sequential composition of filter units

use super::{FilterUnit, OutputFormat};
use crate::media::{Dimensions, FrameTransform, PixelBuffer};
use tracing::debug;

/// Runs stages in order, feeding each stage's output into the next
///
/// Only the first stage sees the caller's transform and target size; later
/// stages take the previous stage's output as their native input.
pub struct GroupFilter {
    stages: Vec<Box<dyn FilterUnit>>,
    format: Option<OutputFormat>,
    switch_input_dimensions: bool,
}

impl GroupFilter {
    pub fn new(stages: Vec<Box<dyn FilterUnit>>) -> Self {
        Self {
            stages,
            format: None,
            switch_input_dimensions: false,
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl FilterUnit for GroupFilter {
    fn setup_format_description(
        &mut self,
        input: Dimensions,
        transform: Option<FrameTransform>,
        output: Option<Dimensions>,
    ) {
        let mut stage_input = input;
        for (index, stage) in self.stages.iter_mut().enumerate() {
            if index == 0 {
                stage.set_switch_input_dimensions(self.switch_input_dimensions);
                stage.setup_format_description(stage_input, transform, output);
            } else {
                stage.setup_format_description(stage_input, None, None);
            }
            if let Some(format) = stage.output_format() {
                stage_input = format.dimensions;
            }
        }

        debug!(
            stages = self.stages.len(),
            input = %input,
            output = %stage_input,
            "Filter group set up"
        );
        self.format = Some(OutputFormat {
            dimensions: stage_input,
            input_dimensions: input,
        });
    }

    fn output_format(&self) -> Option<OutputFormat> {
        self.format
    }

    fn process(&mut self, input: &PixelBuffer, time: f64) -> Option<PixelBuffer> {
        self.format?;
        let mut current = input.clone();
        for stage in &mut self.stages {
            current = stage.process(&current, time)?;
        }
        Some(current)
    }

    fn cleanup(&mut self) {
        for stage in &mut self.stages {
            stage.cleanup();
        }
        self.format = None;
    }

    fn switch_input_dimensions(&self) -> bool {
        self.switch_input_dimensions
    }

    fn set_switch_input_dimensions(&mut self, switch: bool) {
        self.switch_input_dimensions = switch;
        if let Some(first) = self.stages.first_mut() {
            first.set_switch_input_dimensions(switch);
        }
    }
}
