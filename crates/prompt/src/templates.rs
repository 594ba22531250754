//! Handlebars templates used by conversations.

/// Rewrites a follow-up into a standalone question.
pub const CONDENSE_QUESTION: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language.

Chat History:
{{history}}
Follow Up Input: {{question}}
Standalone question:";

/// System prompt for `stuff`: every chunk at once.
pub const STUFF: &str = "Use the following pieces of context to answer the user's question.
If you don't know the answer, just say that you don't know. Don't try to make up an answer.
----------------
{{context}}";

/// System prompt for the map step of `map_reduce`.
pub const MAP_QUESTION: &str = "Use the following portion of a long document to see if any of \
the text is relevant to answer the question.
Return any relevant text verbatim.
______________________
{{context}}";

/// System prompt for the reduce step of `map_reduce`.
pub const MAP_COMBINE: &str = "Given the following extracted parts of a long document and a \
question, create a final answer.
If you don't know the answer, just say that you don't know. Don't try to make up an answer.
______________________
{{summaries}}";

/// System prompt for the first chunk of `refine`.
pub const REFINE_QUESTION: &str = "Context information is below.
---------------------
{{context}}
---------------------
Given the context information and not prior knowledge, answer any questions";

/// User prompt for every following chunk of `refine`.
pub const REFINE_STEP: &str = "The original question is: {{question}}
We have provided an existing answer: {{existing_answer}}
We have the opportunity to refine the existing answer (only if needed) with some more context below.
------------
{{context}}
------------
Given the new context, refine the original answer to better answer the question. \
If the context isn't useful, return the original answer.";

/// Prompt for `map_rerank`: answer plus a confidence score.
pub const MAP_RERANK: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.

In addition to giving an answer, also return a score of how fully it answered the user's question. \
This should be in the following format:

Question: [question here]
Helpful Answer: [answer here]
Score: [score between 0 and 100]

Begin!

Context:
---------
{{context}}
---------
Question: {{question}}
Helpful Answer:";
