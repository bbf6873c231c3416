// src/moderation/format.rs - Text the bot sends to authors

/// Chunk size kept below the platform's 2000 character limit
pub const CHUNK_SIZE: usize = 1900;

pub fn codeblock_wrap(s: &str) -> String {
    format!("```\n{}\n```", s)
}

/// Split into pieces of at most `size` characters, never inside a character
pub fn chunk_response(s: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars.chunks(size.max(1)).map(|c| c.iter().collect()).collect()
}

/// Quote the message, escape its spoilers so the outer spoiler holds, and
/// credit the author
pub fn prep_msg_for_resend(content: &str, author_id: u64) -> String {
    let quoted = content
        .split('\n')
        .map(|line| format!("> {}", line))
        .collect::<Vec<_>>()
        .join("\n");
    let escaped = quoted.replace("||", r"\|\|");
    format!("<@{}> li toki e ni kepeken ala toki pona: ||\n{} ||", author_id, escaped)
}

pub fn delete_dm(content: &str) -> String {
    format!(
        "sina toki pona ala la mi weka e toki sina ni:\n{}\nsina wile ala e weka la o ante e nasin sina",
        codeblock_wrap(content)
    )
}

pub fn react_error_dm(content: &str, react: &str) -> String {
    format!(
        "mi alasa sitelen e toki sina ni:\n{}\nmi alasa kepeken sitelen ni, taso mi ken ala:\n{}",
        codeblock_wrap(content),
        codeblock_wrap(react)
    )
}
