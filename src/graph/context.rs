/// Mode flags threaded into every layer during a forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Dropout and batch statistics are only active when set.
    pub training: bool,
    /// Divisor that turns a summed loss into the reported batch loss.
    pub number_of_losses: usize,
}

impl ExecutionContext {
    pub fn training(number_of_losses: usize) -> ExecutionContext {
        ExecutionContext { training: true, number_of_losses }
    }

    pub fn inference() -> ExecutionContext {
        ExecutionContext { training: false, number_of_losses: 1 }
    }
}
