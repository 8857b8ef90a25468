//! Escape-time iteration for a single point of the complex plane.

/// Number of iterations before `z ↦ z² + c` leaves the radius-2 disc,
/// capped at `max_iterations`.
///
/// Starts from `z₀ = c` and stops as soon as `|z²|² > 4`, so a point whose
/// first square already escapes scores zero.
pub fn escape_time(c_re: f64, c_im: f64, max_iterations: u32) -> u32 {
    let (mut z_re, mut z_im) = (c_re, c_im);
    let mut k = 0;

    while k < max_iterations {
        let sq_re = z_re * z_re - z_im * z_im;
        let sq_im = 2.0 * z_re * z_im;
        if sq_re * sq_re + sq_im * sq_im > 4.0 {
            break;
        }
        z_re = sq_re + c_re;
        z_im = sq_im + c_im;
        k += 1;
    }
    k
}
