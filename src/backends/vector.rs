/// A trait for vector-like types that can carry a system's state in variable order.
///
/// This trait lets numeric consumers (plotting, external solvers) move state in and
/// out of a [`System`](crate::system::System) without going through name-keyed maps.
/// Values are ordered like [`System::variables`](crate::system::System::variables).
///
/// # Examples
///
/// ```rust
/// use evalexpr_flow::prelude::StateVector;
///
/// let vec = Vec::<f64>::from_values(vec![1.0, 2.0]);
/// assert_eq!(vec.to_values(), vec![1.0, 2.0]);
/// assert_eq!(StateVector::len(&vec), 2);
/// ```
pub trait StateVector {
    /// Builds the vector from values in variable order.
    fn from_values(values: Vec<f64>) -> Self;

    /// Returns the values in variable order.
    fn to_values(&self) -> Vec<f64>;

    /// Returns the length of the vector.
    fn len(&self) -> usize;

    /// Checks if the vector is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateVector for Vec<f64> {
    fn from_values(values: Vec<f64>) -> Self {
        values
    }

    fn to_values(&self) -> Vec<f64> {
        self.clone()
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// Implementation of StateVector for ndarray's Array1<f64>.
#[cfg(feature = "ndarray")]
impl StateVector for ndarray::Array1<f64> {
    fn from_values(values: Vec<f64>) -> Self {
        ndarray::Array1::from_vec(values)
    }

    fn to_values(&self) -> Vec<f64> {
        self.iter().copied().collect()
    }

    fn len(&self) -> usize {
        self.len()
    }
}

/// Implementation of StateVector for nalgebra's DVector<f64>.
#[cfg(feature = "nalgebra")]
impl StateVector for nalgebra::DVector<f64> {
    fn from_values(values: Vec<f64>) -> Self {
        nalgebra::DVector::from_vec(values)
    }

    fn to_values(&self) -> Vec<f64> {
        self.iter().copied().collect()
    }

    fn len(&self) -> usize {
        self.len()
    }
}
