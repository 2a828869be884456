//! Extract the executable program from a synthesized response.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::error::SynthesisParseError;

static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:javascript|js)[^\n]*\n?(.*?)```").expect("code block regex")
});

static FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^|[;\s])(async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*\(([^)]*)\)")
        .expect("function regex")
});

/// A program ready to be sent to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Name of the entry function; becomes the skill name.
    pub name: String,
    /// All extracted code blocks joined.
    pub code: String,
    /// `await <name>(bot);`
    pub invocation: String,
}

impl Program {
    /// Code followed by the invocation, as executed by `step`.
    pub fn executable(&self) -> String {
        format!("{}\n{}", self.code, self.invocation)
    }
}

#[derive(Debug)]
struct Declaration<'a> {
    is_async: bool,
    name: &'a str,
    params: usize,
}

/// Pull the entry function out of a free-form response.
///
/// Collects every fenced `javascript`/`js` block, requires at least one
/// top-level function declaration and picks the last `async` one, which must
/// take exactly one parameter.
pub fn extract_program(response: &str) -> Result<Program, SynthesisParseError> {
    let blocks: Vec<&str> = CODE_BLOCK
        .captures_iter(response)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim()))
        .filter(|block| !block.is_empty())
        .collect();
    if blocks.is_empty() {
        return Err(SynthesisParseError::NoCode);
    }
    let code = blocks.join("\n");

    let declarations = top_level_functions(&code);
    if declarations.is_empty() {
        return Err(SynthesisParseError::NoFunction);
    }
    let entry = declarations
        .iter()
        .rev()
        .find(|decl| decl.is_async)
        .ok_or(SynthesisParseError::NoAsyncEntry)?;
    if entry.params != 1 {
        return Err(SynthesisParseError::EntryArity {
            name: entry.name.to_string(),
            count: entry.params,
        });
    }

    Ok(Program {
        name: entry.name.to_string(),
        invocation: format!("await {}(bot);", entry.name),
        code,
    })
}

fn top_level_functions(code: &str) -> Vec<Declaration<'_>> {
    FUNCTION
        .captures_iter(code)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if brace_depth(&code[..whole.start()]) != 0 {
                return None;
            }
            let params = caps
                .get(3)
                .map(|m| m.as_str().split(',').filter(|p| !p.trim().is_empty()).count())
                .unwrap_or(0);
            Some(Declaration {
                is_async: caps.get(1).is_some(),
                name: caps.get(2)?.as_str(),
                params,
            })
        })
        .collect()
}

/// Net `{`/`}` depth of `prefix`, ignoring string literals and comments.
fn brace_depth(prefix: &str) -> i32 {
    let mut depth = 0;
    let mut chars = prefix.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            '"' | '\'' | '`' => {
                let mut escaped = false;
                for inner in chars.by_ref() {
                    if escaped {
                        escaped = false;
                    } else if inner == '\\' {
                        escaped = true;
                    } else if inner == c {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            _ => {}
        }
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_last_async_function_as_entry() {
        let response = "Explain: chop a tree.\n\
            ```javascript\n\
            function helper(x) { return x + 1; }\n\
            async function mineWoodLog(bot) {\n  await bot.chat(\"hi\");\n}\n\
            ```\n\
            ```js\n\
            async function craftSticks(bot) {\n  const inner = async function (a, b) {};\n}\n\
            ```";
        let program = extract_program(response).expect("program");
        assert_eq!(program.name, "craftSticks");
        assert_eq!(program.invocation, "await craftSticks(bot);");
        assert!(program.code.contains("function helper"));
        assert!(program.executable().ends_with("\nawait craftSticks(bot);"));
    }

    #[test]
    fn nested_functions_are_not_entries() {
        let response = "```javascript\n\
            async function outer(bot) {\n  async function inner(a, b) {}\n  await inner(1, 2);\n}\n\
            ```";
        let program = extract_program(response).expect("program");
        assert_eq!(program.name, "outer");
    }

    #[test]
    fn braces_in_strings_do_not_confuse_depth() {
        let response = "```javascript\n\
            const banner = \"{{{\";\n\
            // } stray brace in comment\n\
            async function run(bot) {}\n\
            ```";
        assert_eq!(extract_program(response).expect("program").name, "run");
    }

    #[test]
    fn reports_each_failure_kind() {
        assert_eq!(extract_program("no code here"), Err(SynthesisParseError::NoCode));
        assert_eq!(
            extract_program("```javascript\nconst x = 1;\n```"),
            Err(SynthesisParseError::NoFunction)
        );
        assert_eq!(
            extract_program("```javascript\nfunction run(bot) {}\n```"),
            Err(SynthesisParseError::NoAsyncEntry)
        );
        assert_eq!(
            extract_program("```javascript\nasync function run(bot, mcData) {}\n```"),
            Err(SynthesisParseError::EntryArity {
                name: "run".to_string(),
                count: 2
            })
        );
    }
}
