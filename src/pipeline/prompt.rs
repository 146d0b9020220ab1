use super::context::ConversationTurn;
use super::schema::SchemaDescriptor;

/// Question/SQL pairs shown to the model before every request.
const WORKED_EXAMPLES: &[(&str, &str)] = &[
    ("How many students?", "SELECT COUNT(*) FROM STUDENT;"),
    ("All CSE students", "SELECT * FROM STUDENT WHERE CLASS='CSE';"),
    ("All Data Science students", "SELECT * FROM STUDENT WHERE CLASS='Data Science';"),
    ("All AIML students", "SELECT * FROM STUDENT WHERE CLASS='AIML';"),
    ("All CSE-AIML students", "SELECT * FROM STUDENT WHERE CLASS='CSE-AIML';"),
    ("All CAI students", "SELECT * FROM STUDENT WHERE CLASS='CAI';"),
    ("Section A students", "SELECT * FROM STUDENT WHERE SECTION='A';"),
    ("All female students", "SELECT * FROM STUDENT WHERE GENDER='Female';"),
    ("All male students", "SELECT * FROM STUDENT WHERE GENDER='Male';"),
    ("Average marks", "SELECT ROUND(AVG(MARKS),1) AS AVG_MARKS FROM STUDENT;"),
    (
        "Highest marks",
        "SELECT * FROM STUDENT WHERE MARKS=(SELECT MAX(MARKS) FROM STUDENT);",
    ),
    ("Students with marks above 80", "SELECT * FROM STUDENT WHERE MARKS > 80;"),
    (
        "Class wise average",
        "SELECT CLASS, ROUND(AVG(MARKS),1) AS AVG_MARKS FROM STUDENT GROUP BY CLASS ORDER BY AVG_MARKS DESC;",
    ),
    (
        "Section wise count",
        "SELECT CLASS, SECTION, COUNT(*) AS COUNT FROM STUDENT GROUP BY CLASS, SECTION ORDER BY CLASS, SECTION;",
    ),
    (
        "Gender wise count",
        "SELECT GENDER, COUNT(*) AS COUNT FROM STUDENT GROUP BY GENDER;",
    ),
    ("Top 5 students", "SELECT * FROM STUDENT ORDER BY MARKS DESC LIMIT 5;"),
    (
        "Girls in CSE section A",
        "SELECT * FROM STUDENT WHERE CLASS='CSE' AND SECTION='A' AND GENDER='Female';",
    ),
    (
        "Pass count per department",
        "SELECT CLASS, COUNT(*) AS PASS FROM STUDENT WHERE MARKS>=40 GROUP BY CLASS;",
    ),
    (
        "Students between 60 and 80 marks",
        "SELECT * FROM STUDENT WHERE MARKS BETWEEN 60 AND 80;",
    ),
    (
        "Count of students per department",
        "SELECT CLASS, COUNT(*) AS TOTAL FROM STUDENT GROUP BY CLASS ORDER BY TOTAL DESC;",
    ),
];

/// Example questions offered in the UI.
pub fn example_questions() -> impl Iterator<Item = &'static str> {
    WORKED_EXAMPLES.iter().map(|(question, _)| *question)
}

/// Assembles every prompt the assistant sends. Pure: the same inputs always
/// give byte-identical output.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    schema: SchemaDescriptor,
    preamble: String,
}

impl PromptBuilder {
    pub fn new(schema: SchemaDescriptor) -> Self {
        let preamble = Self::render_preamble(&schema);
        Self { schema, preamble }
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    fn render_preamble(schema: &SchemaDescriptor) -> String {
        let mut out = String::from("You are an expert SQL assistant. ");
        out.push_str(&schema.describe());
        out.push_str("\nConvert the user's question into a valid SQL query.\n\nExamples:\n");

        let width = WORKED_EXAMPLES
            .iter()
            .map(|(q, _)| q.len() + 2)
            .max()
            .unwrap_or(0);
        for (question, sql) in WORKED_EXAMPLES {
            out.push_str(&format!(
                "- {:<width$} -> {}\n",
                format!("\"{}\"", question),
                sql,
                width = width
            ));
        }

        out.push_str("\nSTRICT RULES:\n");
        out.push_str("- Return ONLY the raw SQL query: no explanation, no ``` fences, no word \"sql\".\n");
        out.push_str("- Never use DROP, DELETE, INSERT, UPDATE, ALTER, CREATE, TRUNCATE, EXEC or EXECUTE.\n");
        out.push_str("- Always end the query with a semicolon.\n");
        out.push_str(&format!("- Use exact values: {}\n", schema.value_rules()));
        out
    }

    /// SQL generation prompt, optionally folding in earlier turns.
    pub fn build(&self, question: &str, history: Option<&[ConversationTurn]>) -> String {
        let mut prompt = self.preamble.clone();

        match history {
            Some(turns) if !turns.is_empty() => {
                prompt.push_str("\nCONVERSATION HISTORY (for context):\n");
                for turn in turns {
                    prompt.push_str(&format!("{}: {}\n", turn.role.label(), turn.content));
                }
                prompt.push_str(
                    "\nIMPORTANT: Use the conversation history to understand follow-up questions.\n\
                     The latest message may refer to an earlier query (for example \"now only section A\"); \
                     in that case modify the previously generated SQL instead of starting from scratch.\n\
                     Return ONLY the raw SQL query for the latest user message.\n",
                );
                prompt.push_str(&format!("\nLatest user message: {}\nSQL:", question.trim()));
            }
            _ => {
                prompt.push_str(&format!("\n\nQuestion: {}\nSQL:", question.trim()));
            }
        }

        prompt
    }

    pub fn language_check(&self, text: &str) -> String {
        format!("Is this text written in English? Reply with only YES or NO:\n{}", text)
    }

    pub fn translation(&self, text: &str) -> String {
        format!(
            "Translate this to English. Return ONLY the English translation, nothing else:\n{}",
            text
        )
    }

    pub fn explanation(&self, sql: &str) -> String {
        format!(
            "Explain this SQL query in simple plain English for a non-technical person.\n\
             Be concise: 2 to 3 sentences only. Focus on what data it retrieves.\n\n\
             SQL: {}",
            sql
        )
    }

    pub fn optimization(&self, sql: &str) -> String {
        format!(
            "Review this SQL query and suggest an improved version if possible.\n\
             Explain the improvement in 1-2 sentences. If the query is already optimal, say so.\n\n\
             SQL: {}",
            sql
        )
    }

    pub fn insights(&self, table: &str) -> String {
        format!(
            "Analyze this {} data and provide exactly 5 concise bullet-point insights.\n\
             Focus on patterns, top/bottom performers, group comparisons, and notable trends.\n\
             Format each point starting with a relevant emoji.\n\n\
             Data:\n{}",
            self.schema.table.to_lowercase(),
            table
        )
    }

    pub fn sample_questions(&self) -> String {
        format!(
            "Generate exactly 8 useful natural language questions a user can ask about a database table with these columns: {}\n\
             Number them 1-8. Make them varied: include filters, aggregations, comparisons, and rankings.",
            self.schema.column_summary()
        )
    }
}
