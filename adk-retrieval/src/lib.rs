//! # adk-retrieval
//!
//! Indexing and retrieval core for ADK-Rust RAG pipelines.
//!
//! ## Features
//!
//! - **Chunking**: sentence-aware and token splitters with overlap, metadata
//!   budgeting and deterministic node ids
//! - **Indices**: list, keyword-table and vector-backed indices sharing one
//!   insert / delete / update / refresh lifecycle
//! - **Storage**: a node store and an index store with JSON persistence
//! - **Retrieval**: dense, BM25, keyword-table and hybrid AND/OR fusion
//! - **Postprocessing**: similarity and delta cutoffs, keyword filters and
//!   cross-encoder reranking composed into a pipeline
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use adk_retrieval::{
//!     Document, IndexConfig, InMemoryVectorStore, RetrieverConfig, ServiceContext,
//!     StorageContext, VectorStoreIndex,
//! };
//!
//! let storage = StorageContext::new().with_vector_store(Arc::new(InMemoryVectorStore::new()));
//! let service = ServiceContext::builder().embed_model(Arc::new(my_embedder)).build()?;
//! let index = VectorStoreIndex::from_documents(
//!     &[Document::new("doc-1", "Rust is a systems programming language.")],
//!     storage,
//!     service,
//!     IndexConfig::default(),
//! )
//! .await?;
//!
//! let retriever = index.as_retriever(&RetrieverConfig::default())?;
//! let results = retriever.retrieve(&"what is rust?".into()).await?;
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Provides |
//! |---|---|
//! | `openai` | `OpenAIEmbeddingProvider` |

pub mod analysis;
pub mod chunking;
pub mod config;
pub mod data_struct;
pub mod docstore;
pub mod embedding;
pub mod error;
pub mod indices;
pub mod inmemory;
pub mod keyword;
pub mod llm;
pub mod node;
pub mod pipeline;
pub mod postprocessor;
pub mod query;
pub mod retrievers;
pub mod service;
pub mod storage;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;

pub use analysis::TextAnalyzer;
pub use chunking::{
    Chunker, IdFn, NodeParser, SentenceSplitter, SimpleTokenizer, TextSplitter,
    TokenTextSplitter, Tokenizer, default_id_fn,
};
pub use config::{
    IndexConfig, PostprocessorConfig, RagConfig, RetrieverConfig, SplitterConfig, SplitterMode,
};
pub use data_struct::{
    IndexDict, IndexList, IndexStore, IndexStruct, IndexStructKind, KeywordTable,
    SimpleIndexStore,
};
pub use docstore::{NodeStore, RefDocInfo, SimpleNodeStore};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use indices::{
    AnyIndex, Index, KeywordTableIndex, ListIndex, VectorStoreIndex, load_index_from_storage,
};
pub use inmemory::InMemoryVectorStore;
pub use keyword::{KeywordExtractor, LlmKeywordExtractor, RakeKeywordExtractor, SimpleKeywordExtractor};
pub use llm::CompletionModel;
pub use node::{
    Document, Metadata, MetadataMode, MetadataValue, Node, NodeRelationship, RelatedNodeInfo,
    ScoredNode,
};
pub use pipeline::{RetrieverQueryEngine, RetrieverQueryEngineBuilder};
pub use postprocessor::{
    CrossEncoder, CrossEncoderRerank, DeltaSimilarityPostprocessor, KeywordNodePostprocessor,
    MeanDeltaSimilarityPostprocessor, NoOpPostprocessor, NodePostprocessor,
    PostprocessorPipeline, SimilarityPostprocessor,
};
pub use query::{ExactMatchFilter, MetadataFilters, QueryBundle};
pub use retrievers::{
    Bm25Retriever, FusionMode, HybridRetriever, KeywordTableRetriever,
    KeywordTableRetrieverMode, ListIndexEmbeddingRetriever, ListIndexRetriever,
    ListRetrieverMode, Retriever, VectorIndexRetriever,
};
pub use service::{ServiceContext, ServiceContextBuilder};
pub use storage::StorageContext;
pub use vectorstore::{VectorStore, VectorStoreQuery, VectorStoreQueryMode, VectorStoreQueryResult};

#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
