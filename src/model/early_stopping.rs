/// Outcome of feeding one epoch's validation loss to [`EarlyStopping`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// New best loss; the caller should persist a checkpoint.
    Improved,
    /// No improvement for `stalled_epochs` consecutive epochs, still below patience.
    Stalled { stalled_epochs: usize },
    /// Patience exhausted; training should end.
    Stop,
}

/// Best-so-far tracker for the validation loss.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best_loss: f64,
    best_epoch: Option<usize>,
    stalled_epochs: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_loss: f64::INFINITY,
            best_epoch: None,
            stalled_epochs: 0,
        }
    }

    /// Only a strictly lower loss counts as an improvement; NaN never does.
    pub fn observe(&mut self, epoch: usize, loss: f64) -> Verdict {
        if loss < self.best_loss {
            self.best_loss = loss;
            self.best_epoch = Some(epoch);
            self.stalled_epochs = 0;
            return Verdict::Improved;
        }

        self.stalled_epochs += 1;
        if self.stalled_epochs >= self.patience {
            Verdict::Stop
        } else {
            Verdict::Stalled {
                stalled_epochs: self.stalled_epochs,
            }
        }
    }

    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn patience(&self) -> usize {
        self.patience
    }
}
