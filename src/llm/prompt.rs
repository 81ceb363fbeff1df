/// Builds the single prompt sent to the model for one question.
pub fn build_prompt(question: &str, schema: Option<&str>) -> String {
    let schema_section = match schema {
        Some(schema) => format!(
            "The query will run on a SQLite database with the following tables and columns:\n\n{}\n\n",
            schema.trim()
        ),
        None => String::new(),
    };

    format!(
        r#"You are a SQL query generator. You will be given a question in natural language and you need to write one SQLite query that answers it.
Example - How many entries are there in the table?
    SQL command: SELECT COUNT(*) FROM table_name;
{}Rules:
- Return exactly one statement, written on a single line.
- Do not wrap the statement in quotes, backticks or code fences.
- Use only table and column names that exist in the database.
- No preamble, no explanation, just the valid SQL query.

Convert the following text into a SQL query: {}"#,
        schema_section,
        question.trim()
    )
}
