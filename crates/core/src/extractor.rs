use crate::error::IngestError;
use lopdf::Document;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    /// Returns one entry per page in page order. Pages that cannot be
    /// decoded carry empty text.
    fn extract_pages(&self, pdf: &[u8]) -> Result<Vec<PageText>, IngestError>;

    fn extract_text(&self, pdf: &[u8]) -> Result<String, IngestError> {
        let pages = self.extract_pages(pdf)?;
        Ok(pages.into_iter().map(|page| page.text).collect())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, pdf: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load_mem(pdf).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    warn!(page = page_no, %error, "page text extraction failed");
                    String::new()
                }
            };

            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

pub fn extract_text(pdf: &[u8]) -> Result<String, IngestError> {
    LopdfExtractor.extract_text(pdf)
}

#[cfg(test)]
mod tests {
    use super::{extract_text, LopdfExtractor, PdfExtractor};
    use crate::error::IngestError;
    use crate::testing::sample_pdf;

    #[test]
    fn pages_are_returned_in_order() {
        let pdf = sample_pdf(&["First page", "Second page", "Third page"]);
        let pages = LopdfExtractor
            .extract_pages(&pdf)
            .expect("generated pdf should load");

        assert_eq!(pages.len(), 3);
        assert_eq!(
            pages.iter().map(|page| page.number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(pages[0].text.contains("First page"));
        assert!(pages[2].text.contains("Third page"));
    }

    #[test]
    fn text_is_concatenated_in_page_order() {
        let pdf = sample_pdf(&["alpha", "omega"]);
        let text = extract_text(&pdf).expect("generated pdf should load");

        let alpha = text.find("alpha").expect("first page text present");
        let omega = text.find("omega").expect("second page text present");
        assert!(alpha < omega);
    }

    #[test]
    fn non_pdf_bytes_are_rejected() {
        let result = extract_text(b"plain text, definitely not a pdf");
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
    }
}
