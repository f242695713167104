/// Table name for an aggregate's event log, grounded on the teacher's
/// `{aggregate_name}_events` convention (`query::create_table_statement`).
pub fn events_table(aggregate_name: &str) -> String {
    format!("{aggregate_name}_events")
}

/// Table name for this aggregate's sequence-stats high-water-mark cache.
pub fn sequence_stats_table(aggregate_name: &str) -> String {
    format!("{aggregate_name}_sequence_stats")
}

/// Builds a `WHERE event_type IN (...)` fragment plus its bind count, or an empty string when
/// `event_classes` is empty (no filter), per invariant 5 (filter soundness).
pub fn event_class_predicate(event_classes: &[&'static str], placeholder: impl Fn(usize) -> String) -> String {
    if event_classes.is_empty() {
        return String::new();
    }

    let placeholders: Vec<String> = (0..event_classes.len()).map(placeholder).collect();
    format!("AND event_type IN ({})", placeholders.join(", "))
}
