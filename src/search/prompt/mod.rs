
/// Fixed answer for anything the context does not cover
pub const REFUSAL: &str = "I don't have the necessary information to answer your question.";

/// Out-of-context questions shown to the model, each answered with [`REFUSAL`]
pub const EXAMPLE_QUESTIONS: [&str; 3] = [
    "What is the capital of France?",
    "How many customers do we have in 2024?",
    "Do you think this is good or bad?",
];

/// Render the answer prompt. Context and question are inserted verbatim.
#[inline]
pub fn render(context: &str, question: &str) -> String {
    let [first, second, third] = EXAMPLE_QUESTIONS;

    format!(
        r#"CONTEXT:
{context}

RULES:
- Answer only based on the CONTEXT.
- If the information is not explicitly in the CONTEXT, answer:
  "{REFUSAL}"
- Never invent or use external knowledge.
- Never produce opinions or interpretations beyond what is written.

EXAMPLES OF OUT-OF-CONTEXT QUESTIONS:
Question: "{first}"
Answer: "{REFUSAL}"

Question: "{second}"
Answer: "{REFUSAL}"

Question: "{third}"
Answer: "{REFUSAL}"

USER QUESTION:
{question}

ANSWER THE "USER QUESTION""#
    )
}
