use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use path_solver::{BfsSolver, Solver};
use tracing::{debug, warn};
use transport_bridge::messages::{NavigationRequestPayload, NavigationResultPayload};
use transport_bridge::{BridgeLink, BridgeMessage, RequestHandler};

/// Answers `navigation_request` with a solved grid path.
pub struct PlannerAgent {
    solver: Arc<dyn Solver>,
}

impl PlannerAgent {
    pub fn new(solver: Arc<dyn Solver>) -> Self {
        Self { solver }
    }

    pub fn solve(&self, request: &NavigationRequestPayload) -> NavigationResultPayload {
        let started = Instant::now();
        let solved = request
            .grid
            .markers()
            .map_err(|err| err.to_string())
            .and_then(|(start, target)| {
                self.solver
                    .solve(&request.grid, start, target)
                    .map_err(|err| err.to_string())
            });
        let inference_time_ms = Some(started.elapsed().as_millis() as u64);
        match solved {
            Ok(path) => {
                debug!(
                    target: "planner",
                    solver = self.solver.name(),
                    cells = path.len(),
                    from = %request.current_screen.short(),
                    to = %request.target_screen.short(),
                    "path solved"
                );
                NavigationResultPayload {
                    success: true,
                    path,
                    inference_time_ms,
                    error: None,
                }
            }
            Err(error) => {
                warn!(target: "planner", %error, "no path");
                NavigationResultPayload {
                    success: false,
                    path: Vec::new(),
                    inference_time_ms,
                    error: Some(error),
                }
            }
        }
    }
}

impl Default for PlannerAgent {
    fn default() -> Self {
        Self::new(Arc::new(BfsSolver))
    }
}

#[async_trait]
impl RequestHandler for PlannerAgent {
    async fn handle(&self, request: BridgeMessage, _link: BridgeLink) -> BridgeMessage {
        match request {
            BridgeMessage::NavigationRequest {
                request_id,
                payload,
            } => BridgeMessage::NavigationResult {
                request_id,
                payload: self.solve(&payload),
            },
            other => BridgeMessage::error(
                other.request_id().map(str::to_string),
                format!("planner cannot serve {}", other.kind()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_compiler::{Cell, TokenGrid};
    use wayfinder_core_types::StateId;

    fn request(tokens: Vec<u8>, width: usize, height: usize) -> NavigationRequestPayload {
        NavigationRequestPayload {
            current_screen: StateId::new("fp_a"),
            target_screen: StateId::new("fp_b"),
            grid: TokenGrid::from_tokens(tokens, width, height).unwrap(),
        }
    }

    #[test]
    fn solves_and_times_the_request() {
        let result = PlannerAgent::default().solve(&request(vec![2, 1, 3], 3, 1));
        assert!(result.success);
        assert_eq!(result.path, vec![Cell::new(0, 0), Cell::new(0, 1), Cell::new(0, 2)]);
        assert!(result.inference_time_ms.is_some());
    }

    #[test]
    fn walled_off_target_reports_failure() {
        let result = PlannerAgent::default().solve(&request(vec![2, 0, 3], 3, 1));
        assert!(!result.success);
        assert!(result.path.is_empty());
        assert!(result.error.is_some());
    }
}
