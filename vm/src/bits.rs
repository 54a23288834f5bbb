/// Returns bit `pos` of `value` as `0` or `1`.
#[inline(always)]
pub const fn bit(value: u64, pos: u32) -> u64 {
    assert!(pos < 64);

    (value >> pos) & 0b1
}

/// Extracts `value[high:low]`, zero-extended.
#[inline(always)]
pub const fn bits(value: u64, high: u32, low: u32) -> u64 {
    assert!(high < 64 && low <= high);

    let width = high - low + 1;

    if width == 64 {
        value
    } else {
        (value >> low) & ((1 << width) - 1)
    }
}

/// Extracts `value[high:low]` and sign-extends it from its own top bit.
#[inline(always)]
pub const fn sbits(value: u64, high: u32, low: u32) -> u64 {
    assert!(high < 64 && low <= high);

    (((value as i64) << (63 - high)) >> (63 - high + low)) as u64
}

/// Sign-extends `value` from bit `high`, discarding everything above it.
#[inline(always)]
pub const fn sext(value: u64, high: u32) -> u64 {
    sbits(value, high, 0)
}
