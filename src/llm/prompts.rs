//! Prompt builders.
//!
//! The tag conventions are load-bearing: every machine-readable payload is
//! requested inside a named tag, and callers extract the last occurrence with
//! [`crate::llm::text_within_tags`]. An empty assistant turn is appended to
//! anchor the completion.

use crate::llm::client::ChatMessage;

const SUMMARY_SAMPLE_JSON: &str = r#"
{
    "MAIN_ENTITY": {
        "NAME": "<FULL_NAME>",
        "ATTRIBUTES" : [
            { "INDUSTRY": "<ATTRIBUTE_VALUE>" },
            { "FOCUS_AREA": ["<ATTRIBUTE_VALUE>"] },
            { "REVENUE_GENERATING_INDUSTRIES": ["<ATTRIBUTE_VALUE>"] },
            { "SUMMARY_OF_BUSINESS_PERFORMANCE": "<ATTRIBUTE_VALUE>" },
            { "SUMMARY_OF_BUSINESS_STRATEGY": "<ATTRIBUTE_VALUE>" }
        ]
    }
}
"#;

const EXTRACTION_SAMPLE_JSON: &str = r#"
{
    "COMMERCIAL_PRODUCTS_OR_SERVICES": [
        { "NAME": "<FULL_PRODUCT_NAME>" }
    ],
    "CUSTOMERS": [
        { "NAME": "<FULL_COMPANY_NAME>", "PRODUCTS_USED": "<MAPPED TO ONE OF THE ITEM FROM COMMERCIAL_PRODUCTS_OR_SERVICES>", "FOCUS_AREA": "<COMPANY_BUSINESS_FOCUS_AREA>", "INDUSTRY": "<INDUSTRY>" }
    ],
    "SUPPLIERS_OR_PARTNERS": [
        { "NAME": "<FULL_COMPANY_NAME>", "RELATIONSHIP": "<RELATIONSHIP_DETAILS_WITH_MAIN_ENTITY>", "FOCUS_AREA": "<COMPANY_BUSINESS_FOCUS_AREA>", "INDUSTRY": "<INDUSTRY>" }
    ],
    "COMPETITORS": [
        { "NAME": "<FULL_COMPANY_NAME>", "COMPETING_IN": "<PRODUCTS_OR_AREAS_IN_COMPETITION>", "FOCUS_AREA": "<COMPANY_BUSINESS_FOCUS_AREA>", "INDUSTRY": "<INDUSTRY>" }
    ],
    "DIRECTORS" : [
        { "NAME": "<FULL_PERSON_NAME_EXCLUDE_TITLES>", "ROLE": "<ROLE_IN_MAIN_ENTITY>", "OTHER_ASSOCIATIONS": [ {"ROLE": "<ROLE_IN_OTHER_ASSOCIATIONS>", "COMPANY_NAME" : "<COMPANY_NAMES>", "FOCUS_AREA": "<COMPANY_BUSINESS_FOCUS_AREA>", "INDUSTRY": "<INDUSTRY>" } ] }
    ]
}
"#;

const NEWS_SAMPLE_JSON: &str = r#"
[{
"NAME": "<COMPANY_OR_PERSON_FULL_NAME>", "LABEL": "COMPANY_OR_PERSON", "INDUSTRY": "<INDUSTRY_OF_COMPANY_OR_INDUSTRY_THE_PERSON_WORKED_IN>", "SENTIMENT": "<POSITIVE_OR_NEUTRAL_OR_NEGATIVE>", "SENTIMENT_EXPLANATION": "<EXPLANATION_OF_SENTIMENT_IDENTIFIED>",
"RELATIONSHIPS": [
    { "RELATED_ENTITY": "<RELATED_COMPANY_OR_PERSON_FULL_NAME>", "LABEL": "COMPANY_OR_PERSON", "RELATIONSHIP": "<ROLE_OF_RELATIONSHIP>" }
]
}]
"#;

fn with_empty_assistant(content: String) -> Vec<ChatMessage> {
    vec![ChatMessage::user(content), ChatMessage::assistant("")]
}

/// Main-entity summary over the head of the document.
pub fn document_summary(text: &str) -> Vec<ChatMessage> {
    with_empty_assistant(format!(
        r#"
I will provide you with a document that which is a subset of a larger document.  Read it carefully as I will be asking you questions about it.

Here is the document:
<document>
{text}
</document>

1) Identify the full name of the main entity discussed in <document> and any key qualitative attributes mentioned.  Leave array empty if you cannot identify any.

2) Identify the industry that the main entity is operating in.  Leave string value empty if you cannot identify any.

3) Identity the focus area that the main entity is focusing on.  Leave array empty if you cannot identify any.

4) Identify the revenue generating industries that the main entity is operating in.  Leave array empty if you cannot identify any.

5) Summarize the business performance of the main entity.  Leave string value empty if you cannot identify any.

6) Summarize the business strategy of the main entity.  Leave string value empty if you cannot identify any.

7) It is important that you print out the output within <results></results> xml tag using the following JSON format and ensure that the output is a valid JSON format.
{SUMMARY_SAMPLE_JSON}
"#
    ))
}

/// Per-chunk structured extraction of the five record classes.
pub fn chunk_extraction(summary_json: &str, main_entity_name: &str, text: &str) -> Vec<ChatMessage> {
    with_empty_assistant(format!(
        r#"
I will provide you with a document that which is a subset of a larger document which discusses about the main entity provided in <main_entity></main_entity> tags.
<main_entity>
{summary_json}
</main_entity>

Read this document carefully as I will be asking you questions about it.

Here is the document:
<document>
{text}
</document>

Using the text enclosed within <document></document> tag, perform the following steps:
1) Identify named commercial products or services provided by {main_entity_name}. Leave array empty if you cannot identify any. For any values that you cannot determine, return empty string.

2) Identify customers of {main_entity_name}. Leave array empty if you cannot identify any. For any values that you cannot determine, return empty string.

3) Identify suppliers or partners of {main_entity_name}. Leave array empty if you cannot identify any. For any values that you cannot determine, return empty string.

4) Identify competitors of {main_entity_name}. Leave array empty if you cannot identify any. For any values that you cannot determine, return empty string.

5) Identify directors of {main_entity_name} and their current / prior roles with other companies within <document></document>. Leave array empty if you cannot identify any. For any values that you cannot determine, return empty string.

6) Be as complete as you can in your idenfication of all information, and include any mentioned information even if they were mentioned to be in the past.

7) If attributes such as industry or focus area are not available, derive it using the context from the surrounding text.

8) Print out your thought process explaining the relationship of each entity within <thoughts></thoughts> xml tag.

9) It is important that you print out the output within <results></results> xml tag using the following JSON format and ensure that the output is a valid JSON format.
{EXTRACTION_SAMPLE_JSON}
"#
    ))
}

/// Company-class record buckets that share the same classifier wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyBucket {
    Customers,
    SuppliersOrPartners,
    Competitors,
}

impl CompanyBucket {
    /// Tag name the classifier must answer inside, and the relationship
    /// phrasing used in the prompt.
    pub fn tag(&self) -> &'static str {
        match self {
            CompanyBucket::Customers => "customers",
            CompanyBucket::SuppliersOrPartners => "suppliers_or_partners",
            CompanyBucket::Competitors => "competitors",
        }
    }

    fn described_as(&self) -> &'static str {
        match self {
            CompanyBucket::Customers => "customers",
            CompanyBucket::SuppliersOrPartners => "suppliers or partners",
            CompanyBucket::Competitors => "competitors",
        }
    }
}

/// Classifier that keeps only real companies/organisations in a bucket.
pub fn filter_companies(
    bucket: CompanyBucket,
    records_json: &str,
    main_entity_name: &str,
) -> Vec<ChatMessage> {
    let tag = bucket.tag();
    let described_as = bucket.described_as();
    let json_format = "{\n\t\"<COMPANY_NAME>\": { \"<ATTRIBUTE_NAME>\": \"<ATTRIBUTE_VALUE>\" },\n\t...\n}";
    with_empty_assistant(format!(
        r#"
I will provide you with a JSON object of companies who are {described_as} of {main_entity_name}.
The JSON object is in this format:
{json_format}

Here is the JSON object of companies:
<{tag}>
{records_json}
</{tag}>

Perform the following steps:
1. Categorise each item in <{tag}> into companies/conglomerates/organisations vs others.
2. Keep only companies/conglomerates/organisations and remove every other categories.
3. Some of the attributes may be missing due to lack of information in the source document but this does not necessarily mean that an item is not a company/conglomerate/organisation.
4. If there are some indication that an item is a company/conglomerate/organisation even though there are limited information, you may include it as an company/conglomerate/organisation.
5. Assess each item individually and print your explanation within <explanation> tags.
6. After printing the explanation, print an array containing only names of companies/conglomerates/organisations between <{tag}></{tag}> tags.  E.g. [ "COMPANY" ]
"#
    ))
}

/// Classifier that keeps only real people (first + last name) in the
/// directors bucket, deduplicating name variants in the same round.
pub fn filter_directors(records_json: &str, main_entity_name: &str) -> Vec<ChatMessage> {
    let json_format =
        "{\n\t{ \"<PERSON_NAME>\" : { \"<ATTRIBUTE_NAME>\": \"<ATTRIBUTE_VALUE>\" },\n    ...\n}";
    with_empty_assistant(format!(
        r#"
I will provide you with a JSON object of people who works for {main_entity_name}.
The JSON object is in this format:
{json_format}

Here is the JSON object of people:
<people>
{records_json}
</people>

1. For each item in <people>, identify whether it has a first name and a last name and print them.
2. Print names that have at least a first name and a last name.  Remove all other items.
3. If a person's name have multiple variations, make sure you keep the different versions for step 4.
4. Next, print an array containing only names of actual people between <people></people> tags.  E.g. <people>[ "PERSON_NAME1", "PERSON_NAME2", ... ]</people>
5. You are to work with only the information provided in the context.
6. Do not print codes.
"#
    ))
}

/// Entity disambiguation against a candidate set from the graph.
pub fn disambiguation(entity_json: &str, candidate_blocks: &str) -> Vec<ChatMessage> {
    with_empty_assistant(format!(
        r#"
You are an expert in disambiguating entities and determining if they are the same entity when given limited information.

You are to review through the list of potential entities, and reason through the given information to determine if any of them are the same as the entity provided within <entity> tags.

You are to follow these rules strictly:
1. You will only use the information provided in the context in your disambiguation.
2. Subsidiaries or joint ventures should not be considered as the same entity as the parent company; they are to be considered as distinctly different entities.
3. Parent companies should not be considered the same as the child company.
4. As the entities are extracted from different sources, you should take into consideration that one entity may have much richer information than the other.  The differences in the level of detailed information between each potential entity and the provided entity should not indicate that the entities are different.
5. As the amount of information provided may be different for each potential entity and the provided entity, the potential entity does not need to fully match the provided entity to be considered the same.  It is sufficient if there are enough similarities without much conflicting differences.
6. Companies with the same name and operating in the same industry or focus area have a strong likelihood to be the same entity.

Here is the entity:

<entity>
{entity_json}
</entity>

Here are the list of potential entities that may be the same as the above entity:

{candidate_blocks}

If you determined that a potential entity is likely to be the same as the entity provided, then reply with the ID of the potential entity within <results></results> tag.  You should only return a maximum of 1 ID.

If you determined that none of the potential entities are the same as the entity provided, reply with "NO MATCH FOUND" within <results></results> tag.

Provide your explanation within <explanation> tags.

Think step by step.
"#
    ))
}

/// Entity/sentiment/relationship extraction from a news article.
pub fn news_extraction(article: &str) -> Vec<ChatMessage> {
    with_empty_assistant(format!(
        r#"
Here is a news article:
<article>
{article}
</article>

Extract out any companies or people mentioned in the article, their sentiment, and their relationships with any entities mentioned in the article.
For any attributes that you cannot determine, attempt to derive it using context from surrounding text.  Otherwise return empty string.
Print them out in a JSON array in the following format within <entities></entities> tag:
{NEWS_SAMPLE_JSON}
"#
    ))
}

/// Synthetic long-form article for pipeline testing; the generated text is
/// marked fictional and wrapped in `<news>` tags.
pub fn generate_article(date: &str, entities_json: &str) -> Vec<ChatMessage> {
    let entities_prompt = if entities_json.is_empty() {
        String::new()
    } else {
        format!(
            "\nYou are to mention the following entities and generate news according to their given sentiment.\n{entities_json}\n"
        )
    };
    with_empty_assistant(format!(
        r#"
You are a random financial news generator that generates long form financial news articles.

The date of the news article is: {date}

{entities_prompt}

Print the generated financial news article in the following format:
<news>
<date></date>
<title></title>
<text>[THIS IS A FICTIONAL NEWS FOR TESTING PURPOSES ONLY] </text>
<url>N/A</url>
</news>
"#
    ))
}

/// Impact assessment of an article on an interested entity along one path.
pub fn impact_assessment(
    article: &str,
    path: &str,
    interested_entity: &str,
    news_entity: &str,
) -> Vec<ChatMessage> {
    with_empty_assistant(format!(
        r#"
You will be given a news article, and its connection to an entity.
You are to assess the potential impact of the news article on an interested entity based on its connection.
You are risk adverse and sensitive to negative news.

Here is the news article:
<article>
{article}
</article>

Here is the entity mentioned in the news article:
<news_entity>
{news_entity}
</news_entity>

Here is the entity I am interested in:
<interested_entity>
{interested_entity}
</interested_entity>

Here is how the news entity is connected to the entity I am interested in:
<path>
{path}
</path>

Based on the impact of the news to <news_entity> and the <path> provided, perform the following:
1) Print out a concise and short summary of the potential impact to <interested_entity> between <result></result> tag.  Highlight phrases that mentions the impact to <interested_entity> and the reasons why using <b></b> tags.
2) Print out either POSITIVE/NEGATIVE/NEUTRAL impact to <interested_entity> between <impact></impact> tag.
"#
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_end_with_empty_assistant_turn() {
        let messages = document_summary("some text");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, "assistant");
        assert!(messages[1].content.is_empty());
    }

    #[test]
    fn filter_prompt_uses_bucket_tag() {
        let messages = filter_companies(CompanyBucket::SuppliersOrPartners, "{}", "ACME");
        assert!(messages[0].content.contains("<suppliers_or_partners>"));
        assert!(messages[0].content.contains("suppliers or partners of ACME"));
    }

    #[test]
    fn extraction_prompt_names_the_main_entity() {
        let messages = chunk_extraction("{\"NAME\":\"ACME\"}", "ACME", "chunk text");
        assert!(messages[0].content.contains("customers of ACME"));
        assert!(messages[0].content.contains("<results>"));
    }
}
