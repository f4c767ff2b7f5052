use serde::{Deserialize, Serialize};

/// Robust loss applied to the squared norm `s` of a residual.
pub trait RobustLoss: Send + Sync {
    /// Loss value `rho(s)`.
    fn rho(&self, squared_norm: f64) -> f64;

    /// Derivative `rho'(s)`, used as the weight of the residual in the normal equations.
    fn weight(&self, squared_norm: f64) -> f64;
}

/// Identity loss: plain least squares.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityLoss;

impl RobustLoss for IdentityLoss {
    fn rho(&self, squared_norm: f64) -> f64 {
        squared_norm
    }

    fn weight(&self, _squared_norm: f64) -> f64 {
        1.0
    }
}

/// Huber loss: quadratic up to `delta`, linear beyond.
#[derive(Debug, Clone, Copy)]
pub struct HuberLoss {
    /// Residual norm at which the loss turns linear.
    pub delta: f64,
}

impl HuberLoss {
    /// Create new Huber loss. Panics if delta <= 0.
    pub fn new(delta: f64) -> Self {
        assert!(delta > 0.0, "Huber delta must be positive, got {}", delta);
        HuberLoss { delta }
    }
}

impl RobustLoss for HuberLoss {
    fn rho(&self, squared_norm: f64) -> f64 {
        let delta_sq = self.delta * self.delta;
        if squared_norm <= delta_sq {
            squared_norm
        } else {
            2.0 * self.delta * squared_norm.sqrt() - delta_sq
        }
    }

    fn weight(&self, squared_norm: f64) -> f64 {
        let delta_sq = self.delta * self.delta;
        if squared_norm <= delta_sq {
            1.0
        } else {
            self.delta / squared_norm.sqrt()
        }
    }
}

/// Cauchy loss: `c^2 ln(1 + s / c^2)`.
#[derive(Debug, Clone, Copy)]
pub struct CauchyLoss {
    /// Scale `c` of the loss.
    pub scale: f64,
}

impl CauchyLoss {
    /// Create new Cauchy loss. Panics if scale <= 0.
    pub fn new(scale: f64) -> Self {
        assert!(scale > 0.0, "Cauchy scale must be positive, got {}", scale);
        CauchyLoss { scale }
    }
}

impl RobustLoss for CauchyLoss {
    fn rho(&self, squared_norm: f64) -> f64 {
        let scale_sq = self.scale * self.scale;
        scale_sq * (squared_norm / scale_sq).ln_1p()
    }

    fn weight(&self, squared_norm: f64) -> f64 {
        let scale_sq = self.scale * self.scale;
        1.0 / (1.0 + squared_norm / scale_sq)
    }
}

/// Configurable choice of robust loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobustLossKind {
    /// Plain least squares.
    None,
    /// [`HuberLoss`].
    #[default]
    Huber,
    /// [`CauchyLoss`].
    Cauchy,
}

impl RobustLossKind {
    /// Instantiate the loss with the given scale.
    ///
    /// The scale is ignored for [`RobustLossKind::None`]. Panics on a
    /// non-positive scale for the robust kinds.
    pub fn build(&self, scale: f64) -> Box<dyn RobustLoss> {
        match self {
            RobustLossKind::None => Box::new(IdentityLoss),
            RobustLossKind::Huber => Box::new(HuberLoss::new(scale)),
            RobustLossKind::Cauchy => Box::new(CauchyLoss::new(scale)),
        }
    }
}

impl std::fmt::Display for RobustLossKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RobustLossKind::None => "none",
            RobustLossKind::Huber => "huber",
            RobustLossKind::Cauchy => "cauchy",
        };
        write!(f, "{name}")
    }
}
