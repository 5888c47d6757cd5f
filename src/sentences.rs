use crate::grouping::Group;

/// Joins a group's fragments into one sentence.
///
/// A fragment ending in `-` is glued to the next fragment (hyphen dropped, no space).
/// Only one fragment of lookahead is used, and nothing is carried across groups.
pub fn assemble_sentence(group: &Group) -> String {
    let texts = group.texts();
    assemble_fragments(&texts)
}

pub fn assemble_fragments(texts: &[&str]) -> String {
    let mut fragments: Vec<String> = Vec::with_capacity(texts.len());
    let mut idx = 0;
    while idx < texts.len() {
        let current = texts[idx];
        if let Some(stem) = current.strip_suffix('-')
            && idx + 1 < texts.len()
        {
            fragments.push(format!("{}{}", stem, texts[idx + 1]));
            idx += 2;
        } else {
            fragments.push(current.to_string());
            idx += 1;
        }
    }
    capitalize(&fragments.join(" "))
}

/// First character uppercased, the remainder lowercased.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let mut out: String = first.to_uppercase().collect();
    out.push_str(&chars.as_str().to_lowercase());
    out
}

/// Sentences for a whole chapter, flattened in page then group order.
#[derive(Debug, Clone, Default)]
pub struct SentenceBatch {
    pub sentences: Vec<String>,
    offsets: Vec<(usize, usize)>,
}

impl SentenceBatch {
    pub fn from_pages<'a, I>(pages: I) -> Self
    where
        I: IntoIterator<Item = &'a [Group]>,
    {
        let mut batch = SentenceBatch::default();
        for groups in pages {
            let start = batch.sentences.len();
            batch
                .sentences
                .extend(groups.iter().map(assemble_sentence));
            batch.offsets.push((start, groups.len()));
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn page_count(&self) -> usize {
        self.offsets.len()
    }

    /// The slice of `items` belonging to `page`, clipped to what `items` holds.
    pub fn page_slice<'a, T>(&self, page: usize, items: &'a [T]) -> &'a [T] {
        let Some(&(start, count)) = self.offsets.get(page) else {
            return &[];
        };
        let start = start.min(items.len());
        let end = (start + count).min(items.len());
        &items[start..end]
    }

    pub fn page_sentences(&self, page: usize) -> &[String] {
        self.page_slice(page, &self.sentences)
    }
}
