/// 人类可读的字节大小，用于缓存体量与超限告警日志。
///
/// 三位有效数字，且去掉无意义的尾零（1024 → "1 KB"，1536 → "1.5 KB"，
/// 20 MiB → "20 MB"）；数值达到四位时完整输出（如 "1023 KB"）。
pub fn fmt_byte_size(n: usize) -> String {
    const UNITS: [&str; 6] = ["KB", "MB", "GB", "TB", "PB", "EB"];
    if n < 1 {
        return "0 B".to_string();
    }
    let exp = ((usize::BITS - 1 - n.leading_zeros()) / 10) as usize;
    if exp == 0 {
        return format!("{n} B");
    }
    let unit = UNITS[(exp - 1).min(UNITS.len() - 1)];
    let factor = n as f64 / (1u64 << (10 * exp.min(6))) as f64;

    let mut prec: usize = 3;
    while prec < 4 && factor >= 10f64.powi(prec as i32) {
        prec += 1;
    }
    // factor ≥ 1，按有效数字换算小数位后再去尾零
    let int_digits = factor.log10().floor() as usize + 1;
    let decimals = prec.saturating_sub(int_digits);
    let mut formatted = format!("{factor:.decimals$}");
    if formatted.contains('.') {
        while formatted.ends_with('0') {
            formatted.pop();
        }
        if formatted.ends_with('.') {
            formatted.pop();
        }
    }
    format!("{formatted} {unit}")
}
