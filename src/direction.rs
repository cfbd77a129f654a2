/// Describes which way the time index advances.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Direction {
    /// `t -> t + 1`, transporting with `U_t†` of the slice being left.
    #[default]
    Forward,
    /// `t -> t - 1`, transporting with `U_t` of the slice being entered.
    Backward,
}

impl Direction {
    pub fn is_forward(self) -> bool {
        self == Direction::Forward
    }
}
