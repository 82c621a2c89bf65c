//! Symbolic permission strings (`u=wxs,g=x,o=x`) to numeric mode bits.
//!
//! Follows chmod(1) for the subset the provisioner uses: clauses separated
//! by `,`, each `[ugoa]*` followed by one or more `[=+-][rwxst]*` actions.
//! Evaluation starts from `0`, so the result is absolute regardless of
//! umask. `s` sets setuid for `u` and setgid for `g` and is ignored for `o`;
//! `t` sets the sticky bit.

use crate::error::ModeError;

const USER: u32 = 0o700;
const GROUP: u32 = 0o070;
const OTHER: u32 = 0o007;
const SETUID: u32 = 0o4000;
const SETGID: u32 = 0o2000;
const STICKY: u32 = 0o1000;

/// Parse a symbolic mode into its numeric bits.
pub fn parse(mode: &str) -> Result<u32, ModeError> {
    let invalid = |reason: String| ModeError {
        mode: mode.to_string(),
        reason,
    };

    if mode.is_empty() {
        return Err(invalid("empty mode".into()));
    }

    let mut bits = 0u32;
    for clause in mode.split(',') {
        let op_at = clause
            .find(['=', '+', '-'])
            .ok_or_else(|| invalid(format!("clause '{}' has no operator", clause)))?;
        let (who, mut actions) = clause.split_at(op_at);

        let mut who_mask = 0u32;
        for c in who.chars() {
            who_mask |= match c {
                'u' => USER,
                'g' => GROUP,
                'o' => OTHER,
                'a' => USER | GROUP | OTHER,
                other => return Err(invalid(format!("unknown class '{}'", other))),
            };
        }
        if who_mask == 0 {
            who_mask = USER | GROUP | OTHER;
        }

        while let Some(op) = actions.chars().next() {
            let rest = &actions[op.len_utf8()..];
            let end = rest.find(['=', '+', '-']).unwrap_or(rest.len());
            let value = perm_bits(&rest[..end], who_mask).map_err(invalid)?;
            let special = special_mask(who_mask);
            match op {
                '=' => bits = (bits & !(who_mask | special)) | value,
                '+' => bits |= value,
                '-' => bits &= !value,
                _ => return Err(invalid(format!("unexpected '{}'", op))),
            }
            actions = &rest[end..];
        }
    }
    Ok(bits)
}

fn perm_bits(perms: &str, who_mask: u32) -> Result<u32, String> {
    let mut bits = 0u32;
    for c in perms.chars() {
        bits |= match c {
            'r' => 0o444 & who_mask,
            'w' => 0o222 & who_mask,
            'x' => 0o111 & who_mask,
            's' => special_mask(who_mask) & (SETUID | SETGID),
            't' => STICKY,
            other => return Err(format!("unknown permission '{}'", other)),
        };
    }
    Ok(bits)
}

fn special_mask(who_mask: u32) -> u32 {
    let mut mask = 0;
    if who_mask & USER != 0 {
        mask |= SETUID;
    }
    if who_mask & GROUP != 0 {
        mask |= SETGID;
    }
    if who_mask & OTHER != 0 {
        mask |= STICKY;
    }
    mask
}
