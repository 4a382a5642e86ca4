//! This demo integrates the Lorenz attractor from equation text.
//!
//! It shows how to:
//! 1. Write a coupled system with vector shorthand, a vector alias and helpers
//! 2. Build a `System` with an initial state
//! 3. Integrate it with the default Euler strategy and read the trajectory back
//!
//! Run with `RUST_LOG=debug` to see how the equations are expanded and classified.

use evalexpr_flow::prelude::*;

fn main() -> Result<(), SystemError> {
    tracing_subscriber::fmt::init();

    let equations = [
        EquationInput::new("r = ((x, y, z))").with_latex(r"\vec r = (x, y, z)"),
        EquationInput::new("dr/dt = ((sigma(y - x), x(rho - z) - y, x y - beta z))"),
        EquationInput::new("sigma = 10"),
        EquationInput::new("rho = 28"),
        EquationInput::new("beta = (8)/(3)"),
        EquationInput::new("radius = sqrt(x^2 + y^2 + z^2)"),
    ];

    let mut system = SystemBuilder::new(equations)
        .initial_state(State::from([
            ("x".to_string(), 1.0),
            ("y".to_string(), 1.0),
            ("z".to_string(), 1.0),
        ]))
        .build()?;

    println!("{system}");

    let trajectory = system.integrate(20.0, 0.005)?;
    for (i, state) in trajectory.iter().enumerate().step_by(400) {
        println!(
            "step {:>5}: x = {:>9.4}  y = {:>9.4}  z = {:>9.4}",
            i, state["x"], state["y"], state["z"]
        );
    }

    println!("radius at t = {:.2}: {:.4}", system.time(), system.evaluate_var("radius")?);

    let position: Vec<f64> = system.state_vector();
    println!("final position: {position:?}");

    Ok(())
}
