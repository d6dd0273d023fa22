//! Shape a waveform from the command line: the formula is recompiled for
//! every argument, the sample loop just stores and evaluates.

use std::env;
use std::ptr::addr_of;

use exp_jit::Evaluator;

fn main() -> exp_jit::Result<()> {
    let formula = env::args()
        .nth(1)
        .unwrap_or_else(|| "sin(2*pi*t) * gain(bnd(t, 1), 0.3)".to_string());

    let mut t = 0.0f64;
    let mut eval = Evaluator::new()?;
    unsafe { eval.bind(addr_of!(t), "t")? };

    if let Err(err) = eval.set_expression(&formula) {
        eprintln!("cannot compile '{}': {}", formula, err);
        return Err(err);
    }

    const COLUMNS: usize = 64;
    for sample in 0..32 {
        t = sample as f64 / 32.0;
        let value = eval.evaluate().clamp(-1.0, 1.0);
        let column = ((value + 1.0) / 2.0 * (COLUMNS - 1) as f64) as usize;
        println!("{:5.3} {:>width$}", t, "*", width = column + 1);
    }

    Ok(())
}
