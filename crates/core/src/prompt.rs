//! Instruction texts sent to the model. All prompts are Arabic and framed
//! for Egyptian bookkeeping.

pub const EXTRACTION_PROMPT: &str = r#"
أنت محاسب محترف تعمل في السوق المصري.

حلل المستند المرفق وحدد نوع المعاملة:
- income (دخل)
- expense (مصروف)

استخرج الحقول التالية بأسمائها كما هي بالضبط.
إذا لم تجد أي معلومة، ضع null ولا تخمن.
القيم الرقمية يجب أن تكون أرقامًا أو null، وليست نصوصًا.

أرجع JSON فقط بدون أي نص إضافي:

{
 "transaction_type": "income أو expense",
 "document_type": null,
 "invoice_number": null,
 "date": null,
 "party_name": null,
 "category": null,
 "description": null,
 "subtotal": null,
 "tax_amount": null,
 "total_amount": null,
 "payment_method": null,
 "currency": "EGP",
 "confidence_score": 0.0
}
"#;

pub fn query_prompt(table_text: &str, question: &str) -> String {
    format!(
        r#"
البيانات:
{table_text}

السؤال:
{question}

أجب بصيغة JSON فقط:
{{
 "answer_text": "",
 "answer_numeric": null,
 "rows": []
}}
"#
    )
}

pub fn narrative_prompt(table_text: &str) -> String {
    format!(
        r#"
أنت محلل مالي. اكتب ملخصًا سرديًا موجزًا للأداء المالي بناءً على المعاملات التالية.
لا تذكر أرقامًا غير موجودة في البيانات.

البيانات:
{table_text}

أرجع JSON فقط:
{{
 "summary": ""
}}
"#
    )
}

pub const TEMPLATE_NARRATIVE: &str = "يعرض هذا التقرير نظرة شاملة على الأداء المالي. \
تم استخراج البيانات تلقائيًا من المستندات باستخدام الذكاء الاصطناعي، \
مما يساعد على تقليل الأخطاء اليدوية وتحسين سرعة اتخاذ القرار.";
