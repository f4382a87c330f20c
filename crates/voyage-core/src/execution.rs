//! The in-memory execution state a Journal `reconstruct` produces and a
//! running state machine carries between step boundaries.

use crate::context::WorkingMap;
use crate::status::Direction;
use crate::step::StepError;

#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub cursor: usize,
    pub direction: Direction,
    pub working_map: WorkingMap,
    pub last_exception: Option<StepError>,
}

impl ExecutionState {
    pub fn initial(step_count: usize) -> Self {
        let _ = step_count;
        Self {
            cursor: 0,
            direction: Direction::Do,
            working_map: WorkingMap::new(),
            last_exception: None,
        }
    }
}
