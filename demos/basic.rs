//! Bind a few variables of different kinds, compile an expression, sweep
//! the inputs, and watch unbinding invalidate the program.

use std::ptr::addr_of;

use exp_jit::Evaluator;

fn main() -> exp_jit::Result<()> {
    let mut x = 0.0f32;
    let mut y = 0.1f64;
    let mut z = 200i32;

    let mut eval = Evaluator::new()?;
    unsafe {
        eval.bind(addr_of!(x), "x")?;
        eval.bind(addr_of!(y), "y")?;
        // Already taken; this fails and changes nothing.
        assert!(eval.bind(addr_of!(z), "x").is_err());
        eval.bind(addr_of!(z), "z")?;
    }

    eval.set_expression("0.3+(-sin(2.33+x-ln(.3*pi+(88/y)/e)))/(98+z)")?;
    println!("expression: {}", eval.expression());
    println!("code size:  {} bytes", eval.code_size());

    for step in 0..10 {
        let value = eval.evaluate();
        println!("step {:2}: x={:6.2} y={:6.3} z={} -> {:.12}", step, x, y, z, value);
        x -= 0.1;
        y += 0.212;
        z += 2;
    }

    // Unbinding a referenced variable drops the program back to 0.
    eval.unbind("x")?;
    println!("after unbind: {}", eval.evaluate());

    Ok(())
}
