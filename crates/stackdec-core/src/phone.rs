//! Logical phone names of the form `l-c+r`, `l-c`, `c+r` or `c`.

/// Center phone: `a-k+i` → `k`.
pub fn center(name: &str) -> &str {
    right_center(left_center(name))
}

/// Drop the right context: `a-k+i` → `a-k`.
pub fn left_center(name: &str) -> &str {
    match name.find('+') {
        Some(p) => &name[..p],
        None => name,
    }
}

/// Drop the left context: `a-k+i` → `k+i`.
pub fn right_center(name: &str) -> &str {
    match name.find('-') {
        Some(p) => &name[p + 1..],
        None => name,
    }
}

/// Build `l-c+r` from optional contexts.
pub fn compose(left: Option<&str>, center: &str, right: Option<&str>) -> String {
    let mut s = String::with_capacity(center.len() + 8);
    if let Some(l) = left {
        s.push_str(l);
        s.push('-');
    }
    s.push_str(center);
    if let Some(r) = right {
        s.push('+');
        s.push_str(r);
    }
    s
}

/// Prefix `base` (itself `c` or `c+r`) with a left context: `k+i` → `a-k+i`.
pub fn with_left(left: &str, base: &str) -> String {
    let mut s = String::with_capacity(left.len() + base.len() + 1);
    s.push_str(left);
    s.push('-');
    s.push_str(base);
    s
}
