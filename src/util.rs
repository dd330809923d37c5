pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn format_clock(total_secs: u64) -> String {
    let mins = total_secs / 60;
    let secs = total_secs % 60;

    format!("{}:{:02}", mins, secs)
}
