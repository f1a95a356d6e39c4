//! Peephole optimization of generated code.
//!
//! A token written with `out(X)@...` and immediately consumed by `in(X)@...` is dead: both
//! lines are dropped.

/// Which tuple-space primitive a line starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Primitive {
    Out,
    In,
}

/// The argument of an `out(...)@loc` or `in(...)@loc` line, without quotes and surrounding whitespace
fn argument(line: &str, primitive: Primitive) -> Option<&str> {
    let prefix = match primitive {
        Primitive::Out => "out(",
        Primitive::In => "in(",
    };
    let rest = line.trim().strip_prefix(prefix)?;
    let end = rest.rfind(")@")?;
    let argument = rest[..end].trim();
    let argument = argument
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
        .or_else(|| argument.strip_prefix('"').and_then(|inner| inner.strip_suffix('"')))
        .unwrap_or(argument);
    Some(argument.trim())
}

fn cancels(first: &str, second: &str) -> bool {
    match (argument(first, Primitive::Out), argument(second, Primitive::In)) {
        (Some(produced), Some(consumed)) => produced == consumed,
        _ => false,
    }
}

/// One left-to-right pass: drop each `out`/`in` pair on adjacent lines, otherwise keep the line
pub fn peephole_pass<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    let mut optimized = Vec::with_capacity(lines.len());
    let mut index = 0;
    while index < lines.len() {
        let line = lines[index].as_ref();
        match lines.get(index + 1) {
            Some(next) if cancels(line, next.as_ref()) => index += 2,
            _ => {
                optimized.push(line.to_string());
                index += 1;
            }
        }
    }
    optimized
}

/// Repeat the pass until no pair is left, so that pairs exposed by a removal go as well
pub fn optimize<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    let mut current = peephole_pass(lines);
    loop {
        let next = peephole_pass(&current);
        if next.len() == current.len() {
            return current;
        }
        current = next;
    }
}

/// Optimize a block of code line by line
pub fn optimize_code(code: &str) -> String {
    let lines = code.lines().collect::<Vec<_>>();
    let mut optimized = optimize(&lines).join("\n");
    if !optimized.is_empty() {
        optimized.push('\n');
    }
    optimized
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_adjacent_pair_is_removed() {
        let lines = ["out('a')@self", "in('a')@self", "out('b')@self"];
        assert_eq!(optimize(&lines), vec!["out('b')@self"]);
    }

    #[test]
    fn test_different_arguments_are_kept() {
        let lines = ["out('a')@self", "in('b')@self"];
        assert_eq!(optimize(&lines), lines.to_vec());
    }

    #[test]
    fn test_quotes_and_whitespace_are_ignored() {
        let lines = ["  out( 'a' )@self", "\tin(a)@bobLoc"];
        assert!(optimize(&lines).is_empty());
    }

    #[test]
    fn test_single_pass_does_not_look_back() {
        let lines = ["out('a')@self", "out('b')@self", "in('b')@self", "in('a')@self"];
        assert_eq!(peephole_pass(&lines), vec!["out('a')@self", "in('a')@self"]);
        assert!(optimize(&lines).is_empty());
    }

    #[test]
    fn test_in_before_out_is_kept() {
        let lines = ["in('a')@self", "out('a')@self"];
        assert_eq!(optimize(&lines), lines.to_vec());
    }

    #[test]
    fn test_optimize_code_keeps_indentation() {
        let code = "if(x){\n  out('a')@self\n  in('a')@self\n  eval(new T('f'))@self\n}\n";
        assert_eq!(optimize_code(code), "if(x){\n  eval(new T('f'))@self\n}\n");
        assert_eq!(optimize_code("out('a')@self\nin('a')@self\n"), "");
    }

    fn line() -> impl Strategy<Value = String> {
        prop_oneof![
            "[abc]".prop_map(|arg| format!("out('{}')@self", arg)),
            "[abc]".prop_map(|arg| format!("in('{}')@self", arg)),
            Just("eval(new T('x'))@self".to_string()),
        ]
    }

    proptest! {
        #[test]
        fn test_optimize_is_idempotent(lines in prop::collection::vec(line(), 0..24)) {
            let once = optimize(&lines);
            let twice = optimize(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn test_optimize_never_grows(lines in prop::collection::vec(line(), 0..24)) {
            prop_assert!(optimize(&lines).len() <= lines.len());
        }
    }
}
